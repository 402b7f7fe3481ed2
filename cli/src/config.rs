use anyhow::{Context, Result};
use directories::ProjectDirs;
use mise_core::bom::DEFAULT_MAX_DEPTH;
use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub bom_max_depth: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "mise").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Self::from_parts(
            data_dir,
            std::env::var("MISE_DB").ok(),
            std::env::var("MISE_BOM_MAX_DEPTH").ok(),
        )
    }

    /// Resolve settings from a data directory plus the raw `MISE_DB` and
    /// `MISE_BOM_MAX_DEPTH` values.
    pub fn from_parts(
        data_dir: PathBuf,
        db_override: Option<String>,
        max_depth: Option<String>,
    ) -> Result<Self> {
        let db_path = match db_override.filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => data_dir.join("mise.db"),
        };

        let bom_max_depth = match max_depth.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_MAX_DEPTH,
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|d| *d > 0)
                .with_context(|| {
                    format!("MISE_BOM_MAX_DEPTH must be a positive integer, got '{raw}'")
                })?,
        };

        Ok(Config {
            db_path,
            data_dir,
            bom_max_depth,
        })
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok((key, true))
    }
}
