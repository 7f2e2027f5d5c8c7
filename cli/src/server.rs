use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::notify::Notifier;
use crate::spoonacular::SpoonacularClient;
use larder_core::error::Error;
use larder_core::grocery::{
    AdHocItem, GroceryList, ItemKey, ItemState, ListLine, OutboundMessage, build_list,
    compose_message,
};
use larder_core::images::ImageStore;
use larder_core::models::{
    CanonicalIngredient, Channel, ExternalRecipeSummary, NewSavedRecipe, NewUser, Recipe,
    RecipeDetail, SavedRecipe, User,
};
use larder_core::normalize::RecipePayload;
use larder_core::service::{AfterCommit, Delivery, LarderService, run_after_commit, store_image};

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB
const DEFAULT_PAGE_SIZE: i64 = 20;

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<LarderService>>,
    images: Arc<dyn ImageStore>,
    recipes: Arc<SpoonacularClient>,
    notifier: Notifier,
    api_key: Option<String>,
}

impl AppState {
    fn service(&self) -> MutexGuard<'_, LarderService> {
        self.service
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run post-commit hooks off the request path.
    fn after_commit(&self, tasks: Vec<AfterCommit>) {
        if tasks.is_empty() {
            return;
        }
        let images = Arc::clone(&self.images);
        tokio::task::spawn_blocking(move || run_after_commit(tasks, images.as_ref()));
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct SignUpRequest {
    name: String,
    email: String,
    phone: Option<String>,
}

#[derive(Deserialize)]
struct VerifyRequest {
    code: String,
}

#[derive(Deserialize)]
struct OwnerQuery {
    user_id: i64,
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Deserialize)]
struct PageQuery {
    user_id: i64,
    #[serde(default = "default_page_size")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    #[serde(default = "default_page_size")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

#[derive(Deserialize)]
struct RecipeRequest {
    user_id: i64,
    #[serde(flatten)]
    recipe: RecipePayload,
}

#[derive(Serialize)]
struct CreatedId {
    id: i64,
}

#[derive(Serialize)]
struct ImageResponse {
    image: String,
}

#[derive(Deserialize)]
struct PreviewRequest {
    user_id: Option<i64>,
    recipe_id: Option<i64>,
    external_id: Option<i64>,
    /// Explicit base list, used when no recipe is referenced.
    #[serde(default)]
    ingredients: Vec<CanonicalIngredient>,
    /// Item state keyed by `"<ingredient id>"` or `"c<n>"`.
    #[serde(default)]
    state: HashMap<String, ItemState>,
    #[serde(default)]
    ad_hoc: Vec<AdHocItem>,
    title: Option<String>,
}

#[derive(Serialize)]
struct PreviewResponse {
    #[serde(flatten)]
    list: GroceryList,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<OutboundMessage>,
}

#[derive(Deserialize)]
struct SendRequest {
    user_id: i64,
    recipe_id: Option<i64>,
    title: Option<String>,
    #[serde(default)]
    items: Vec<ListLine>,
}

#[derive(Serialize)]
struct SendResponse {
    success: bool,
}

#[derive(Deserialize)]
struct SaveRecipeRequest {
    user_id: i64,
    external_id: i64,
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    image_url: String,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct UpdateSavedRequest {
    user_id: i64,
    notes: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    BadGateway(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::BadGateway(detail) => {
                tracing::error!(%detail, "Upstream service failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream service failed".to_string(),
                )
            }
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

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(_) | Error::MalformedPayload(_) => Self::BadRequest(err.to_string()),
            Error::NotFound(msg) => Self::NotFound(msg),
            Error::Upstream(detail) => Self::BadGateway(detail),
            Error::Persistence(inner) => Self::Internal(inner),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
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

// --- User handlers ---

fn verification_message(code: &str) -> OutboundMessage {
    let subject = "Your larder verification code".to_string();
    OutboundMessage {
        text: format!("Your verification code is {code}\n"),
        html: format!("<p>Your verification code is <strong>{code}</strong></p>\n"),
        subject,
    }
}

async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let signup = state.service().sign_up(&NewUser {
        name: req.name,
        email: req.email,
        phone: req.phone,
    })?;

    let delivery = Delivery {
        channel: Channel::Email,
        to: signup.user.email.clone(),
        message: verification_message(&signup.verification_code),
    };
    if let Err(e) = state.notifier.deliver(&delivery).await {
        tracing::warn!(user_id = signup.user.id, error = %e, "Failed to send verification code");
    }

    Ok((StatusCode::CREATED, Json(signup.user)))
}

async fn verify_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state.service().verify_user(id, &req.code)?;
    Ok(Json(user))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.service().get_user(id)?))
}

// --- Image handlers ---

async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ImageResponse>), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let image = store_image(state.images.as_ref(), &body, content_type)?;
    Ok((StatusCode::CREATED, Json(ImageResponse { image })))
}

// --- Recipe handlers ---

async fn create_recipe(
    State(state): State<AppState>,
    Json(req): Json<RecipeRequest>,
) -> Result<(StatusCode, Json<CreatedId>), ApiError> {
    let recipe = req.recipe.decode()?.into_new(req.user_id);
    let detail = state.service().create_recipe(&recipe)?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedId {
            id: detail.recipe.id,
        }),
    ))
}

async fn list_recipes(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    let recipes = state.service().list_recipes(q.user_id, q.limit, q.offset)?;
    Ok(Json(recipes))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<RecipeDetail>, ApiError> {
    Ok(Json(state.service().get_recipe(q.user_id, id)?))
}

async fn update_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<RecipeRequest>,
) -> Result<Json<RecipeDetail>, ApiError> {
    let update = req.recipe.decode()?.into_update(req.user_id);
    let committed = state.service().update_recipe(id, &update)?;
    state.after_commit(committed.after_commit);
    Ok(Json(committed.value))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<OwnerQuery>,
) -> Result<StatusCode, ApiError> {
    let committed = state.service().delete_recipe(q.user_id, id)?;
    state.after_commit(committed.after_commit);
    Ok(StatusCode::NO_CONTENT)
}

async fn recipe_grocery(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<Vec<CanonicalIngredient>>, ApiError> {
    let (_, base) = state.service().recipe_grocery_base(q.user_id, id)?;
    Ok(Json(base))
}

// --- Grocery handlers ---

fn parse_session(raw: HashMap<String, ItemState>) -> Result<HashMap<ItemKey, ItemState>, ApiError> {
    raw.into_iter()
        .map(|(key, state)| {
            key.parse::<ItemKey>()
                .map(|k| (k, state))
                .map_err(|e| ApiError::BadRequest(format!("{e:#}")))
        })
        .collect()
}

async fn grocery_preview(
    State(state): State<AppState>,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let session = parse_session(req.state)?;

    let (title, base) = match (req.recipe_id, req.external_id) {
        (Some(recipe_id), _) => {
            let user_id = req.user_id.ok_or_else(|| {
                ApiError::BadRequest("user_id is required with recipe_id".to_string())
            })?;
            let (title, base) = state.service().recipe_grocery_base(user_id, recipe_id)?;
            (Some(title), base)
        }
        (None, Some(external_id)) => {
            let (title, base) = state.recipes.ingredients_async(external_id).await?;
            (Some(title), base)
        }
        (None, None) => (None, req.ingredients),
    };
    let title = req.title.or(title);

    let list = build_list(&base, &session, &req.ad_hoc);
    let lines: Vec<ListLine> = list.needed.iter().map(ListLine::from).collect();
    let message = compose_message(title.as_deref(), &lines);
    Ok(Json(PreviewResponse { list, message }))
}

async fn send_grocery(
    state: &AppState,
    req: SendRequest,
    channel: Channel,
) -> Result<Json<SendResponse>, ApiError> {
    let delivery = {
        let service = state.service();
        let title = match (req.title, req.recipe_id) {
            (Some(title), _) => Some(title),
            (None, Some(recipe_id)) => Some(service.get_recipe(req.user_id, recipe_id)?.recipe.title),
            (None, None) => None,
        };
        service.prepare_grocery_delivery(req.user_id, title.as_deref(), &req.items, channel)?
    };

    let Some(delivery) = delivery else {
        return Err(ApiError::BadRequest(
            "Nothing to send: the grocery list is empty".to_string(),
        ));
    };

    state
        .notifier
        .deliver(&delivery)
        .await
        .map_err(|e| ApiError::BadGateway(format!("{e:#}")))?;
    tracing::info!(user_id = req.user_id, ?channel, "Sent grocery list");
    Ok(Json(SendResponse { success: true }))
}

async fn grocery_email(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    send_grocery(&state, req, Channel::Email).await
}

async fn grocery_sms(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    send_grocery(&state, req, Channel::Sms).await
}

// --- External recipe handlers ---

async fn search_recipes(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<ExternalRecipeSummary>>, ApiError> {
    let results = state.recipes.search_async(&q.q, q.limit, q.offset).await?;
    Ok(Json(results))
}

async fn save_recipe(
    State(state): State<AppState>,
    Json(req): Json<SaveRecipeRequest>,
) -> Result<(StatusCode, Json<SavedRecipe>), ApiError> {
    let saved = state.service().save_recipe(&NewSavedRecipe {
        user_id: req.user_id,
        external_id: req.external_id,
        link: req.link.trim().to_string(),
        title: req.title.trim().to_string(),
        image_url: req.image_url.trim().to_string(),
        notes: req.notes.filter(|n| !n.trim().is_empty()),
    })?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn list_saved(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<SavedRecipe>>, ApiError> {
    Ok(Json(state.service().list_saved(q.user_id, q.limit, q.offset)?))
}

async fn update_saved(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateSavedRequest>,
) -> Result<Json<SavedRecipe>, ApiError> {
    let saved = state
        .service()
        .update_saved_notes(req.user_id, id, req.notes.as_deref())?;
    Ok(Json(saved))
}

async fn delete_saved(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<OwnerQuery>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_saved(q.user_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn saved_grocery(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<Vec<CanonicalIngredient>>, ApiError> {
    let saved = state.service().get_saved(q.user_id, id)?;
    let (_, base) = state.recipes.saved_ingredients_async(&saved).await?;
    Ok(Json(base))
}

/// First and last four characters of a key, or a fixed mask when the key is
/// too short to show any of it.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/users", post(sign_up))
        .route("/api/users/{id}", get(get_user))
        .route("/api/users/{id}/verify", post(verify_user))
        .route("/api/images", post(upload_image))
        .route("/api/recipes", post(create_recipe).get(list_recipes))
        .route(
            "/api/recipes/{id}",
            get(get_recipe).put(update_recipe).delete(delete_recipe),
        )
        .route("/api/recipes/{id}/grocery", get(recipe_grocery))
        .route("/api/grocery/preview", post(grocery_preview))
        .route("/api/grocery/email", post(grocery_email))
        .route("/api/grocery/sms", post(grocery_sms))
        .route("/api/search", get(search_recipes))
        .route("/api/saved", post(save_recipe).get(list_saved))
        .route(
            "/api/saved/{id}",
            axum::routing::put(update_saved).delete(delete_saved),
        )
        .route("/api/saved/{id}/grocery", get(saved_grocery))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

pub struct ServerDeps {
    pub service: LarderService,
    pub images: Arc<dyn ImageStore>,
    pub recipes: SpoonacularClient,
    pub notifier: Notifier,
}

pub async fn start_server(
    deps: ServerDeps,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(Mutex::new(deps.service)),
        images: deps.images,
        recipes: Arc::new(deps.recipes),
        notifier: deps.notifier,
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {} (see api_key file in data directory)",
            mask_key(key)
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
    tracing::info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
