//! Backend Error Module
//!
//! Error types for the backend and their conversions.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - BackendError and its status mapping
//! └── conversion.rs - IntoResponse and database error classification
//! ```
//!
//! Store code classifies native database errors where they occur; the
//! layers above only ever see `BackendError` kinds.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

pub use conversion::classify_sqlx_error;
pub use types::BackendError;
