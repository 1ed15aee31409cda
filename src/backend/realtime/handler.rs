/**
 * Duplex Connection Handler
 *
 * `GET /ws` upgrades to a WebSocket and hands both halves to a
 * `SessionRelay`. Credentials come from the `Authorization: Bearer` header
 * or, for browser clients that cannot set headers, a `?token=` query.
 *
 * The token is checked inside the relay so a rejected session still gets
 * a close frame. Requests with no credentials at all are refused before
 * the upgrade, as are new connections once shutdown has begun.
 */

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::HeaderMap,
    response::Response,
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;

use super::relay::{Authenticator, SessionRelay, TopicDirectory};
use super::transport::{WsReader, WsWriter};
use crate::backend::error::BackendError;
use crate::backend::middleware::bearer_token;
use crate::backend::server::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

pub async fn handle_ws_connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConnectQuery>,
) -> Result<Response, BackendError> {
    if state.shutdown.is_cancelled() {
        return Err(BackendError::transient("server is shutting down"));
    }

    let credentials = bearer_token(&headers)
        .map(str::to_string)
        .or(query.token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| BackendError::unauthorized("missing token"))?;

    let authenticator: Arc<dyn Authenticator> = state.authenticator.clone();
    let directory: Arc<dyn TopicDirectory> = state.store.clone();
    let relay = SessionRelay::new(state.bus.clone(), authenticator, directory, &state.shutdown);
    let tracker = state.sessions.clone();

    tracing::debug!("[Relay] upgrading session {}", relay.session_id());
    Ok(ws.on_upgrade(move |socket| {
        tracker.track_future(async move {
            let (sink, stream) = socket.split();
            let report = relay
                .run(&credentials, WsReader::new(stream), WsWriter::new(sink))
                .await;
            tracing::info!(
                "[Relay] session {} closed ({:?}): {} in, {} out, {} echoes suppressed",
                report.session_id,
                report.close_reason,
                report.frames_in,
                report.frames_out,
                report.suppressed_echoes
            );
        })
    }))
}
