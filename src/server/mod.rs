//! HTTP server for the research pipeline
//!
//! REST endpoints for creating and polling jobs, an SSE stream per job and
//! a WebSocket feed of every job's events.

mod events;
pub mod routes;
pub mod state;
pub mod stream;

pub use events::{EventBroadcaster, ServerEvent};
pub use state::ServerAppState;

use axum::{
    extract::State,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue,
    },
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerSettings;
use crate::shutdown::ShutdownHandler;

/// Version information for the server
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    version: String,
    completion_backend: String,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    if origins.is_empty() {
        // Permissive CORS: allow any origin (default for development)
        layer.allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(allowed)
    }
}

/// Full application router
pub fn build_router(state: ServerAppState, cors_origins: &[String]) -> Router {
    Router::new()
        .merge(routes::research_router())
        .route("/ws/events", get(events::ws_handler))
        .route("/health", get(health_handler))
        .route("/api/version", get(version_handler))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until shutdown is requested
pub async fn run_server(state: ServerAppState, settings: &ServerSettings) -> Result<(), String> {
    let addr: SocketAddr = format!("{}:{}", settings.bind, settings.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let cors_display = if settings.cors_origins.is_empty() {
        "*".to_string()
    } else {
        settings.cors_origins.join(", ")
    };

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                  Research Pipeline Server                     ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║                                                               ║");
    println!("║  Server URL: http://{}:{:<24}  ║", settings.bind, settings.port);
    println!("║  Completion backend: {:<40}║", state.service.client_name());
    println!("║  CORS Origins: {:<45}║", cors_display);
    println!("║                                                               ║");
    println!("║  Endpoints:                                                   ║");
    println!("║    POST /api/research/jobs             - Create job           ║");
    println!("║    GET  /api/research/jobs/:id         - Job status           ║");
    println!("║    GET  /api/research/jobs/:id/events  - Job SSE stream       ║");
    println!("║    POST /api/research/stream           - Create and stream    ║");
    println!("║    GET  /ws/events                     - WebSocket events     ║");
    println!("║    GET  /health                        - Health check         ║");
    println!("║                                                               ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    log::info!("Server listening on http://{}", addr);
    serve(listener, state, &settings.cors_origins).await
}

/// Serve on an already bound listener until shutdown is requested.
///
/// In-flight jobs are failed as soon as the signal arrives, before
/// connections drain, so open event streams end with an `error` event.
pub async fn serve(
    listener: TcpListener,
    state: ServerAppState,
    cors_origins: &[String],
) -> Result<(), String> {
    let app = build_router(state.clone(), cors_origins);

    let shutdown_state = state.shutdown_state.clone();
    let registry = state.service.registry().clone();
    let shutdown_signal = async move {
        shutdown_state.wait_for_shutdown().await;
        log::info!("Shutdown signal received, stopping server...");
        ShutdownHandler::with_state(shutdown_state).handle_shutdown(&registry);
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| format!("Server error: {}", e))
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

async fn version_handler(State(state): State<ServerAppState>) -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        completion_backend: state.service.client_name().to_string(),
    })
}
