/**
 * Router Configuration
 *
 * 1. API routes (auth, conversations, participants)
 * 2. `GET /ws` duplex session upgrade
 * 3. `GET /health`
 * 4. Request tracing for everything above
 */

use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::backend::realtime::handle_ws_connect;
use crate::backend::routes::api_routes::configure_api_routes;
use crate::backend::server::state::AppState;

pub fn create_router(app_state: AppState) -> Router<()> {
    let authenticator = Arc::clone(&app_state.authenticator);

    let router = Router::new()
        .route("/ws", get(handle_ws_connect))
        .route("/health", get(health));

    let router = configure_api_routes(router, authenticator);

    router
        .fallback(|| async { (axum::http::StatusCode::NOT_FOUND, "404 Not Found") })
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state)
}

async fn health() -> &'static str {
    "ok"
}
