//! REST API layer using Axum.
//!
//! - Public: `POST /login`, `GET /ping`.
//! - Bearer-token protected: project/test CRUD and the report endpoints.
//! - Every response body is JSON; errors carry a `message` field.

use axum::{
    extract::{FromRequest, FromRequestParts, State},
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::auth::{PasswordVerifier, TokenIssuer};
use crate::config::{Config, Environment};
use crate::error::{panic_response, render_error_detail, ApiError};
use crate::models::{
    Claims, Created, LoginRequest, LoginResponse, MessageResponse, MonthlyProgress, Project, ProjectInput,
    ProjectProgress, Stats, TestCase, TestInput,
};
use crate::report;
use crate::storage::Storage;

/// Shared app state for REST handlers (Arc-wrapped for concurrency)
pub struct AppState {
    pub storage: Storage,
    pub issuer: TokenIssuer,
    pub passwords: PasswordVerifier,
    pub environment: Environment,
    pub frontend_origin: HeaderValue,
}

impl AppState {
    pub fn new(
        storage: Storage,
        issuer: TokenIssuer,
        passwords: PasswordVerifier,
        environment: Environment,
        frontend_origin: HeaderValue,
    ) -> Self {
        Self {
            storage,
            issuer,
            passwords,
            environment,
            frontend_origin,
        }
    }

    pub fn from_config(config: &Config, storage: Storage) -> Result<Self, bcrypt::BcryptError> {
        Ok(Self::new(
            storage,
            TokenIssuer::from_config(config),
            PasswordVerifier::from_config(config)?,
            config.environment,
            config.frontend_origin.clone(),
        ))
    }
}

/// JSON body extractor whose rejections render as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Path extractor whose rejections render as [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

/// Auth guard: verifies the bearer token and stores its claims in request extensions.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::MissingToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingToken)?;

    let claims = state.issuer.validate(token).map_err(|e| {
        // The reason stays in the logs; the client only sees "Unauthorized".
        debug!(reason = %e, "rejected bearer token");
        ApiError::InvalidToken
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Only the configured origin is echoed back; other origins get no CORS headers.
fn cors_layer(origin: &HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list([origin.clone()]))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Create the Axum router with public and protected routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/projects", get(list_projects_handler).post(create_project_handler))
        .route("/projects/:id", put(update_project_handler).delete(delete_project_handler))
        .route("/tests", get(list_tests_handler).post(create_test_handler))
        .route("/tests/:id", put(update_test_handler).delete(delete_test_handler))
        .route("/stats", get(stats_handler))
        .route("/monthly-progress", get(monthly_progress_handler))
        .route("/project-progress", get(project_progress_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let routes = Router::new()
        .route("/ping", get(ping_handler))
        .route("/login", post(login_handler))
        .merge(protected)
        .fallback(not_found_handler);

    with_layers(routes, state)
}

/// Outer middleware shared by every route: panic guard, dev-only error
/// detail, request tracing and CORS.
fn with_layers(routes: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    routes
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::map_response_with_state(state.environment, render_error_detail))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.frontend_origin))
        .with_state(state)
}

fn ensure_found(affected: bool, entity: &'static str) -> Result<(), ApiError> {
    if affected {
        Ok(())
    } else {
        Err(ApiError::NotFound(entity))
    }
}

async fn ping_handler() -> Json<MessageResponse> {
    Json(MessageResponse::new("pong"))
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(MessageResponse::new("Route not found")))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (Some(username), Some(password)) = (payload.username, payload.password) else {
        return Err(ApiError::WrongCredentials);
    };

    let user = state.storage.find_user(&username).await?;

    // bcrypt is CPU-bound; keep it off the async workers. Unknown users are
    // verified against a decoy hash so they cost the same as a wrong password.
    let stored = user.as_ref().map(|u| u.password_hash.clone());
    let verifier = state.clone();
    let verified = tokio::task::spawn_blocking(move || verifier.passwords.check(&password, stored.as_deref()))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let user = match user {
        Some(user) if verified => user,
        _ => {
            warn!(%username, "login failed");
            return Err(ApiError::WrongCredentials);
        }
    };

    let token = state
        .issuer
        .issue(&user.username)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!(username = %user.username, "login succeeded");
    Ok(Json(LoginResponse { token }))
}

// --- Projects ---

async fn list_projects_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(state.storage.list_projects().await?))
}

async fn create_project_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    JsonBody(payload): JsonBody<ProjectInput>,
) -> Result<(StatusCode, Json<Created>), ApiError> {
    let fields = payload.validate()?;
    let id = state.storage.create_project(&fields, Utc::now()).await?;
    info!(id, user = %claims.sub, "project created");
    Ok((
        StatusCode::CREATED,
        Json(Created {
            id,
            message: "Project created successfully".to_string(),
        }),
    ))
}

async fn update_project_handler(
    State(state): State<Arc<AppState>>,
    PathParam(id): PathParam<i64>,
    JsonBody(payload): JsonBody<ProjectInput>,
) -> Result<Json<MessageResponse>, ApiError> {
    let fields = payload.validate()?;
    let affected = state.storage.update_project(id, &fields, Utc::now()).await?;
    ensure_found(affected, "Project")?;
    Ok(Json(MessageResponse::new("Project updated successfully")))
}

async fn delete_project_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    PathParam(id): PathParam<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let affected = state.storage.delete_project(id).await?;
    ensure_found(affected, "Project")?;
    info!(id, user = %claims.sub, "project deleted");
    Ok(Json(MessageResponse::new("Project deleted successfully")))
}

// --- Tests ---

async fn list_tests_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TestCase>>, ApiError> {
    Ok(Json(state.storage.list_tests().await?))
}

async fn create_test_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    JsonBody(payload): JsonBody<TestInput>,
) -> Result<(StatusCode, Json<Created>), ApiError> {
    let fields = payload.validate()?;
    let id = state.storage.create_test(&fields, Utc::now()).await?;
    info!(id, user = %claims.sub, "test created");
    Ok((
        StatusCode::CREATED,
        Json(Created {
            id,
            message: "Test created successfully".to_string(),
        }),
    ))
}

async fn update_test_handler(
    State(state): State<Arc<AppState>>,
    PathParam(id): PathParam<i64>,
    JsonBody(payload): JsonBody<TestInput>,
) -> Result<Json<MessageResponse>, ApiError> {
    let fields = payload.validate()?;
    let affected = state.storage.update_test(id, &fields, Utc::now()).await?;
    ensure_found(affected, "Test")?;
    Ok(Json(MessageResponse::new("Test updated successfully")))
}

async fn delete_test_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    PathParam(id): PathParam<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let affected = state.storage.delete_test(id).await?;
    ensure_found(affected, "Test")?;
    info!(id, user = %claims.sub, "test deleted");
    Ok(Json(MessageResponse::new("Test deleted successfully")))
}

// --- Reports ---

async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(report::stats(&state.storage).await?))
}

async fn monthly_progress_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MonthlyProgress>>, ApiError> {
    Ok(Json(report::monthly_progress(&state.storage).await?))
}

async fn project_progress_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProjectProgress>>, ApiError> {
    Ok(Json(report::project_progress(&state.storage).await?))
}
