/**
 * Application State Management
 *
 * `AppState` is the central state container. `FromRef` implementations
 * let handlers extract only the part they need:
 *
 * ```rust,ignore
 * async fn handler(State(service): State<PgParticipantService>) { ... }
 * ```
 *
 * Every field is cheap to clone: pools, services and the bus share their
 * internals through `Arc`.
 */

use axum::extract::FromRef;
use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::backend::auth::JwtAuthenticator;
use crate::backend::conversations::ConversationService;
use crate::backend::db::PgStore;
use crate::backend::membership::{BusEventSink, ParticipantService};
use crate::backend::realtime::MessageBus;
use crate::backend::server::config::ServerConfig;

pub type PgParticipantService = ParticipantService<PgStore>;
pub type PgConversationService = ConversationService<PgStore>;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    /// Membership and conversation store, also the relay's topic directory
    pub store: Arc<PgStore>,
    pub participants: PgParticipantService,
    pub conversations: PgConversationService,
    /// Per-conversation fan-out for live sessions
    pub bus: MessageBus,
    pub authenticator: Arc<JwtAuthenticator>,
    pub config: Arc<ServerConfig>,
    /// Root scope; every session scope is a child of it
    pub shutdown: CancellationToken,
    /// Tracks live duplex sessions so shutdown can wait for them
    pub sessions: TaskTracker,
}

impl AppState {
    pub fn new(db_pool: PgPool, config: ServerConfig) -> Self {
        let store = Arc::new(PgStore::new(db_pool.clone()));
        let bus = MessageBus::new(config.bus_topic_capacity);
        let events = Arc::new(BusEventSink::new(bus.clone()));

        Self {
            participants: ParticipantService::new(Arc::clone(&store), events),
            conversations: ConversationService::new(Arc::clone(&store)),
            authenticator: Arc::new(JwtAuthenticator::new(&config.jwt_secret)),
            config: Arc::new(config),
            db_pool,
            store,
            bus,
            shutdown: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.db_pool.clone()
    }
}

impl FromRef<AppState> for PgParticipantService {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.participants.clone()
    }
}

impl FromRef<AppState> for PgConversationService {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.conversations.clone()
    }
}

impl FromRef<AppState> for MessageBus {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.bus.clone()
    }
}

impl FromRef<AppState> for Arc<JwtAuthenticator> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.authenticator)
    }
}
