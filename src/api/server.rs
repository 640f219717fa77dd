//! HTTP server implementation

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::AppState;
use crate::api::routes;
use crate::config::ServerConfig;
use crate::rag::QaService;
use crate::Result;

/// Router with every middleware layer applied
pub fn build_app(qa: Arc<QaService>, config: &ServerConfig) -> Router {
    let state = AppState { qa };

    let mut app = Router::new()
        .nest("/api", routes::api_routes(state))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(GlobalConcurrencyLimitLayer::new(
            config.max_concurrent_requests.max(1),
        ))
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        info!("✅ CORS enabled");
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Start the API server
pub async fn serve_api(qa: Arc<QaService>, config: &ServerConfig) -> Result<()> {
    info!("🚀 Starting memberqa API server...");

    let app = build_app(qa, config);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🌐 API server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /api/health - Health check");
    info!("  POST /api/ask    - Answer a question about members");

    axum::serve(listener, app).await?;

    Ok(())
}
