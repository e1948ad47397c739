mod config;
mod db;
mod ingest;
mod models;
mod routes;
mod storage;

use axum::{Router, response::IntoResponse, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;
use routes::{AppState, auth_routes, papers_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pubcatalog=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = db::connect(&config.database_url, config.database_max_connections).await?;
    db::migrate(&pool).await?;
    tracing::info!("Database initialized");

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(pool, config);
    state.store.ensure_dirs().await?;

    let app = app(state);

    tracing::info!("Server running on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .nest("/api/auth", auth_routes())
        .nest("/api/papers", papers_routes(state.config.max_upload_bytes))
        .route("/api/health", get(health_check));

    Router::new()
        .merge(api_routes)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "healthy"}))
}
