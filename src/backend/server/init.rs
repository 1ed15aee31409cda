/**
 * Server Initialization
 *
 * 1. Build the application state from a pool and the configuration
 * 2. Create the router
 * 3. Start the periodic sweep of idle bus channels
 *
 * The returned `ShutdownHandle` stops everything in order: session scopes
 * are cancelled, live sessions are awaited, then the bus is closed.
 */

use axum::Router;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::backend::realtime::MessageBus;
use crate::backend::routes::router::create_router;
use crate::backend::server::config::ServerConfig;
use crate::backend::server::state::AppState;

/// Stops sessions and the bus when the server goes down
#[derive(Clone)]
pub struct ShutdownHandle {
    root: CancellationToken,
    sessions: TaskTracker,
    bus: MessageBus,
}

impl ShutdownHandle {
    /// Resolves once shutdown has been requested
    pub async fn requested(&self) {
        self.root.cancelled().await
    }

    pub fn is_requested(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel every session, wait for them to drain, then close the bus
    pub async fn shutdown(&self) {
        tracing::info!("[Server] shutting down {} live sessions", self.sessions.len());
        self.root.cancel();
        self.sessions.close();
        self.sessions.wait().await;
        self.bus.close();
        tracing::info!("[Server] all sessions drained, bus closed");
    }
}

/// Create the application and its shutdown handle
pub fn create_app(db_pool: PgPool, config: ServerConfig) -> (Router<()>, ShutdownHandle) {
    tracing::info!("Initializing relaychat backend server");

    let app_state = AppState::new(db_pool, config);
    let handle = ShutdownHandle {
        root: app_state.shutdown.clone(),
        sessions: app_state.sessions.clone(),
        bus: app_state.bus.clone(),
    };

    spawn_channel_cleanup(&app_state);
    let app = create_router(app_state);

    tracing::info!("Router configured with periodic cleanup task");
    (app, handle)
}

fn spawn_channel_cleanup(app_state: &AppState) {
    let bus = app_state.bus.clone();
    let shutdown = app_state.shutdown.clone();
    let period = app_state.config.cleanup_interval();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let removed = bus.cleanup_inactive_channels();
                    tracing::debug!("Cleaned up {} inactive bus channels", removed);
                }
            }
        }
    });
}
