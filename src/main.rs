//! KeyPrint - keystroke-biometrics identification service
//!
//! Clients submit timestamped key-press/release events captured while a
//! subject types; the service learns per-subject typing fingerprints
//! from labeled sessions and issues progressively more confident
//! identification verdicts for unlabeled ones.
//!
//! # Architecture
//!
//! ```text
//! events ─▶ normalizer ─▶ feature extractor ─▶ classifier ─▶ calibrator
//!                                                               │
//!            verdict ◀─ session evidence accumulator ◀──────────┘
//! ```
//!
//! Labeled submissions are persisted to PostgreSQL; training rebuilds
//! the classifier from all labeled sessions and atomically swaps the
//! live artifact.

mod config;
mod db;
mod error;
mod handlers;
mod logic;
mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logic::profiler::{ProfilerService, SharedProfiler};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyprint=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    tracing::info!("KeyPrint identification service starting...");
    tracing::info!(
        "Database: {}",
        config.database_url.split('@').last().unwrap_or("***")
    );

    // Initialize database pool
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    // Bring up the identification pipeline; pick up a persisted model
    let profiler: SharedProfiler = Arc::new(ProfilerService::new(config.profiler_settings()));
    profiler.warm_load();
    if !profiler.is_model_loaded() {
        tracing::info!("no model artifact yet - identify responds Unknown until trained");
    }

    // Build application state
    let state = AppState {
        pool,
        config: config.clone(),
        profiler,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub config: config::Config,
    pub profiler: SharedProfiler,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check))
        .route("/api/profiler/identify", post(handlers::profiler::identify))
        .route("/api/profiler/train", post(handlers::profiler::train))
        .route("/api/profiler/status", get(handlers::profiler::status));

    // Labeled submission requires the subject's identity (user JWT)
    let authenticated_routes = Router::new()
        .route("/api/profiler/session", post(handlers::profiler::submit))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_user_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
