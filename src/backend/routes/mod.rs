//! Route Configuration Module
//!
//! ```text
//! routes/
//! ├── mod.rs          - Module exports and documentation
//! ├── router.rs       - Main router creation
//! └── api_routes.rs   - REST endpoints and the auth layer
//! ```
//!
//! Everything under `/api` except signup and login passes through the auth
//! middleware. `/ws` authenticates inside the session relay instead.

pub mod api_routes;
pub mod router;

pub use router::create_router;
