//! Backend Module
//!
//! ```text
//! backend/
//! ├── auth/           - users, tokens, signup/login handlers
//! ├── conversations/  - conversation store and service
//! ├── db/             - Postgres and in-memory stores, units of work
//! ├── error/          - BackendError and conversions
//! ├── membership/     - participant store, status matrix, service, events
//! ├── middleware/     - bearer token verification
//! ├── realtime/       - message bus and session relay
//! ├── routes/         - router assembly
//! └── server/         - config, state, initialization
//! ```

pub mod auth;
pub mod conversations;
pub mod db;
pub mod error;
pub mod membership;
pub mod middleware;
pub mod realtime;
pub mod routes;
pub mod server;
