//! HTTP surface of the social registration backend.
//!
//! # Responsibility
//! - Route registration and health requests.
//! - Run blocking persistence work off the async runtime, one pooled
//!   connection and one session per request.
//!
//! # Invariants
//! - Handlers never hold a connection across an `.await`.
//! - Error bodies are always `{"error": "<message>"}`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use social_core::{
    Argon2PasswordHasher, Registered, RegistrationService, Session, Settings, UserCreate,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

mod error;
pub mod pool;

pub use error::ApiError;
pub use pool::{open_pool, DbPool, PoolError};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pool: DbPool,
    registration: Arc<RegistrationService<Argon2PasswordHasher>>,
}

impl AppState {
    pub fn new(pool: DbPool, hasher: Argon2PasswordHasher) -> Self {
        Self {
            pool,
            registration: Arc::new(RegistrationService::new(hasher)),
        }
    }
}

/// Router options taken from [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Registration is also mounted at `/{api_prefix}/users`. Empty disables it.
    pub api_prefix: String,
    /// Allowed browser origins. Empty disables CORS headers.
    pub cors_origins: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            api_prefix: "api".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

impl RouterConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_prefix: settings.api_prefix.clone(),
            cors_origins: settings.backend_cors_origins.clone(),
        }
    }
}

/// Builds the application router.
pub fn build_router(state: AppState, config: &RouterConfig) -> Router {
    let mut router = Router::new()
        .route("/", post(register_user))
        .route("/health", get(health));
    if !config.api_prefix.is_empty() {
        router = router.route(
            &format!("/{}/users", config.api_prefix),
            post(register_user),
        );
    }

    let router = router.with_state(state);
    match cors_layer(&config.cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(
                    "event=cors_config module=api status=skipped origin={}",
                    origin
                );
                None
            }
        })
        .collect();
    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

async fn health() -> &'static str {
    "ok"
}

/// `POST /`: registers an account and echoes the payload with the password hashed.
async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<UserCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<UserCreate>), ApiError> {
    let Json(payload) = payload?;

    let registered = tokio::task::spawn_blocking(move || -> Result<Registered, ApiError> {
        let conn = state.pool.get()?;
        let mut session = Session::new(&conn);
        Ok(state.registration.register(&mut session, payload)?)
    })
    .await??;

    info!(
        "event=http_request module=api status=ok route=register http_status=201 user_id={}",
        registered.user.id.unwrap_or_default()
    );
    Ok((StatusCode::CREATED, Json(registered.payload)))
}
