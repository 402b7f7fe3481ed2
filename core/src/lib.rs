pub mod bom;
pub mod costing;
pub mod db;
pub mod error;
pub mod lineage;
pub mod models;
pub mod service;
pub mod units;

pub use error::{CoreError, CoreResult};
pub use service::MiseService;
