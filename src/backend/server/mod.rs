//! Server Module
//!
//! ```text
//! server/
//! ├── mod.rs          - Module exports and documentation
//! ├── state.rs        - AppState and FromRef implementations
//! ├── config.rs       - Configuration loading and the database pool
//! └── init.rs         - App creation and ordered shutdown
//! ```

/// Application state management
pub mod state;

/// Server configuration loading
pub mod config;

/// Server initialization
pub mod init;

pub use config::{load_database, ConfigError, ServerConfig};
pub use init::{create_app, ShutdownHandle};
pub use state::{AppState, PgConversationService, PgParticipantService};
