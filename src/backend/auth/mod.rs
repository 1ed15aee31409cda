//! Authentication
//!
//! - `users` - user rows and queries
//! - `sessions` - token issue and verification
//! - `handlers` - signup, login and current-user endpoints

pub mod handlers;
pub mod sessions;
pub mod users;

pub use sessions::{Claims, JwtAuthenticator};
pub use users::User;
