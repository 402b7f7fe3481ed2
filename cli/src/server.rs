use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use mise_core::models::{
    BomEdge, BomTreeNode, CostingResult, Ingredient, NewIngredient, NewRecipe,
    NewRecipeIngredient, Recipe, RecipeIngredient, RecipeStatus, SubRecipeUnit, UpdateBomEdge,
    UpdateIngredient, UpdateRecipe, UpdateRecipeIngredient, VersionEntry,
};
use mise_core::{CoreError, MiseService};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<MiseService>>,
    api_key: Option<String>,
}

impl AppState {
    fn service(&self) -> MutexGuard<'_, MiseService> {
        self.service
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

fn default_yield_quantity() -> f64 {
    1.0
}

fn default_yield_unit() -> String {
    "portion".to_string()
}

#[derive(Deserialize)]
struct CreateRecipeRequest {
    name: String,
    #[serde(default = "default_yield_quantity")]
    yield_quantity: f64,
    #[serde(default = "default_yield_unit")]
    yield_unit: String,
    instructions: Option<String>,
    status: Option<String>,
    #[serde(default)]
    is_public: bool,
    owner_id: Option<String>,
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateRecipeRequest {
    name: Option<String>,
    yield_quantity: Option<f64>,
    yield_unit: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    instructions: Option<Option<String>>,
    is_public: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_some")]
    owner_id: Option<Option<String>>,
}

#[derive(Deserialize)]
struct SetStatusRequest {
    status: String,
}

#[derive(Deserialize)]
struct RecipeListQuery {
    status: Option<String>,
}

#[derive(Deserialize)]
struct ForkQuery {
    owner_id: Option<String>,
}

#[derive(Deserialize)]
struct VersionsQuery {
    viewer_id: Option<String>,
}

#[derive(Deserialize)]
struct ReorderRequest {
    ids: Vec<i64>,
}

#[derive(Deserialize)]
struct AddLineRequest {
    ingredient_id: i64,
    quantity: f64,
    unit: String,
}

#[derive(Deserialize)]
struct UpdateLineRequest {
    quantity: Option<f64>,
    unit: Option<String>,
}

fn default_edge_quantity() -> f64 {
    1.0
}

fn default_edge_unit() -> String {
    SubRecipeUnit::Portion.to_string()
}

#[derive(Deserialize)]
struct AddSubRecipeRequest {
    child_recipe_id: i64,
    #[serde(default = "default_edge_quantity")]
    quantity: f64,
    #[serde(default = "default_edge_unit")]
    unit: String,
}

#[derive(Deserialize)]
struct UpdateSubRecipeRequest {
    quantity: Option<f64>,
    unit: Option<String>,
}

#[derive(Deserialize)]
struct BomTreeQuery {
    max_depth: Option<usize>,
}

#[derive(Deserialize)]
struct CreateIngredientRequest {
    name: String,
    base_unit: String,
    cost_per_base_unit: Option<f64>,
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateIngredientRequest {
    name: Option<String>,
    base_unit: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    cost_per_base_unit: Option<Option<f64>>,
}

#[derive(Deserialize)]
struct IngredientListQuery {
    search: Option<String>,
    #[serde(default)]
    include_inactive: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                tracing::error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            CoreError::CycleDetected { .. } | CoreError::DuplicateEdge { .. } => {
                Self::Conflict(err.to_string())
            }
            CoreError::Invalid(msg) => Self::BadRequest(msg),
            CoreError::InternalConsistency(_) | CoreError::Database(_) => {
                Self::Internal(anyhow::Error::new(err))
            }
        }
    }
}

fn parse_status(raw: &str) -> Result<RecipeStatus, ApiError> {
    raw.parse().map_err(ApiError::from)
}

fn parse_unit(raw: &str) -> Result<SubRecipeUnit, ApiError> {
    raw.parse().map_err(ApiError::from)
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Recipe handlers ---

async fn create_recipe(
    State(state): State<AppState>,
    Json(req): Json<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let status = req
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?
        .unwrap_or(RecipeStatus::Draft);
    let recipe = state.service().create_recipe(&NewRecipe {
        name: req.name,
        yield_quantity: req.yield_quantity,
        yield_unit: req.yield_unit,
        instructions: req.instructions,
        status,
        is_public: req.is_public,
        owner_id: req.owner_id,
    })?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn list_recipes(
    State(state): State<AppState>,
    Query(query): Query<RecipeListQuery>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    Ok(Json(state.service().list_recipes(status)?))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Recipe>, ApiError> {
    Ok(Json(state.service().get_recipe(id)?))
}

async fn update_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateRecipeRequest>,
) -> Result<Json<Recipe>, ApiError> {
    let recipe = state.service().update_recipe(
        id,
        &UpdateRecipe {
            name: req.name,
            yield_quantity: req.yield_quantity,
            yield_unit: req.yield_unit,
            instructions: req.instructions,
            is_public: req.is_public,
            owner_id: req.owner_id,
        },
    )?;
    Ok(Json(recipe))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_recipe(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_recipe_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<Recipe>, ApiError> {
    let status = parse_status(&req.status)?;
    Ok(Json(state.service().set_recipe_status(id, status)?))
}

async fn archive_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Recipe>, ApiError> {
    Ok(Json(state.service().archive_recipe(id)?))
}

async fn fork_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ForkQuery>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let forked = state
        .service()
        .fork_recipe(id, query.owner_id.as_deref())?;
    Ok((StatusCode::CREATED, Json(forked)))
}

async fn get_versions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<VersionsQuery>,
) -> Result<Json<Vec<VersionEntry>>, ApiError> {
    let tree = state
        .service()
        .get_version_tree(id, query.viewer_id.as_deref())?;
    Ok(Json(tree))
}

// --- Ingredient line handlers ---

async fn list_lines(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<RecipeIngredient>>, ApiError> {
    Ok(Json(state.service().list_recipe_ingredients(id)?))
}

async fn add_line(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AddLineRequest>,
) -> Result<(StatusCode, Json<RecipeIngredient>), ApiError> {
    let line = state.service().add_recipe_ingredient(
        id,
        &NewRecipeIngredient {
            ingredient_id: req.ingredient_id,
            quantity: req.quantity,
            unit: req.unit,
        },
    )?;
    Ok((StatusCode::CREATED, Json(line)))
}

async fn reorder_lines(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<Vec<RecipeIngredient>>, ApiError> {
    Ok(Json(
        state.service().reorder_recipe_ingredients(id, &req.ids)?,
    ))
}

async fn update_line(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateLineRequest>,
) -> Result<Json<RecipeIngredient>, ApiError> {
    if req.quantity.is_none() && req.unit.is_none() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }
    let line = state.service().update_recipe_ingredient(
        id,
        &UpdateRecipeIngredient {
            quantity: req.quantity,
            unit: req.unit,
        },
    )?;
    Ok(Json(line))
}

async fn delete_line(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service().remove_recipe_ingredient(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Sub-recipe handlers ---

async fn list_sub_recipes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<BomEdge>>, ApiError> {
    Ok(Json(state.service().list_sub_recipes(id)?))
}

async fn add_sub_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AddSubRecipeRequest>,
) -> Result<(StatusCode, Json<BomEdge>), ApiError> {
    let unit = parse_unit(&req.unit)?;
    let edge = state
        .service()
        .add_sub_recipe(id, req.child_recipe_id, req.quantity, unit)?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn reorder_sub_recipes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<Vec<BomEdge>>, ApiError> {
    Ok(Json(state.service().reorder_sub_recipes(id, &req.ids)?))
}

async fn update_sub_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateSubRecipeRequest>,
) -> Result<Json<BomEdge>, ApiError> {
    let unit = req.unit.as_deref().map(parse_unit).transpose()?;
    let edge = state.service().update_sub_recipe(
        id,
        &UpdateBomEdge {
            quantity: req.quantity,
            unit,
        },
    )?;
    Ok(Json(edge))
}

async fn delete_sub_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service().remove_sub_recipe(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn used_in(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<BomEdge>>, ApiError> {
    Ok(Json(state.service().get_used_in(id)?))
}

async fn bom_tree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<BomTreeQuery>,
) -> Result<Json<BomTreeNode>, ApiError> {
    Ok(Json(state.service().get_bom_tree(id, query.max_depth)?))
}

// --- Costing handlers ---

async fn get_cost(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CostingResult>, ApiError> {
    Ok(Json(state.service().get_recipe_cost(id)?))
}

async fn recompute_cost(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CostingResult>, ApiError> {
    Ok(Json(state.service().recompute_cost(id)?))
}

// --- Ingredient handlers ---

async fn create_ingredient(
    State(state): State<AppState>,
    Json(req): Json<CreateIngredientRequest>,
) -> Result<(StatusCode, Json<Ingredient>), ApiError> {
    let ingredient = state.service().add_ingredient(&NewIngredient {
        name: req.name,
        base_unit: req.base_unit,
        cost_per_base_unit: req.cost_per_base_unit,
    })?;
    Ok((StatusCode::CREATED, Json(ingredient)))
}

async fn list_ingredients(
    State(state): State<AppState>,
    Query(query): Query<IngredientListQuery>,
) -> Result<Json<Vec<Ingredient>>, ApiError> {
    let ingredients = state
        .service()
        .list_ingredients(query.search.as_deref(), query.include_inactive)?;
    Ok(Json(ingredients))
}

async fn get_ingredient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Ingredient>, ApiError> {
    Ok(Json(state.service().get_ingredient(id)?))
}

async fn update_ingredient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateIngredientRequest>,
) -> Result<Json<Ingredient>, ApiError> {
    let ingredient = state.service().update_ingredient(
        id,
        &UpdateIngredient {
            name: req.name,
            base_unit: req.base_unit,
            cost_per_base_unit: req.cost_per_base_unit,
        },
    )?;
    Ok(Json(ingredient))
}

async fn deactivate_ingredient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Ingredient>, ApiError> {
    Ok(Json(state.service().deactivate_ingredient(id)?))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/recipes", post(create_recipe).get(list_recipes))
        .route(
            "/api/recipes/{id}",
            get(get_recipe).put(update_recipe).delete(delete_recipe),
        )
        .route("/api/recipes/{id}/status", put(set_recipe_status))
        .route("/api/recipes/{id}/archive", post(archive_recipe))
        .route("/api/recipes/{id}/fork", post(fork_recipe))
        .route("/api/recipes/{id}/versions", get(get_versions))
        .route(
            "/api/recipes/{id}/ingredients",
            get(list_lines).post(add_line),
        )
        .route("/api/recipes/{id}/ingredients/reorder", post(reorder_lines))
        .route(
            "/api/recipe-ingredients/{id}",
            put(update_line).delete(delete_line),
        )
        .route(
            "/api/recipes/{id}/sub-recipes",
            get(list_sub_recipes).post(add_sub_recipe),
        )
        .route(
            "/api/recipes/{id}/sub-recipes/reorder",
            post(reorder_sub_recipes),
        )
        .route(
            "/api/sub-recipes/{id}",
            put(update_sub_recipe).delete(delete_sub_recipe),
        )
        .route("/api/recipes/{id}/used-in", get(used_in))
        .route("/api/recipes/{id}/bom-tree", get(bom_tree))
        .route("/api/recipes/{id}/cost", get(get_cost))
        .route("/api/recipes/{id}/cost/recompute", post(recompute_cost))
        .route(
            "/api/ingredients",
            get(list_ingredients).post(create_ingredient),
        )
        .route(
            "/api/ingredients/{id}",
            get(get_ingredient)
                .put(update_ingredient)
                .delete(deactivate_ingredient),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    service: MiseService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4.min(key.len())],
            &key[key.len().saturating_sub(4)..],
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    eprintln!("Listening on http://{bind}:{port}");
    tracing::info!(bind, port, "Server started");
    axum::serve(listener, app).await?;

    Ok(())
}
