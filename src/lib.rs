//! relaychat
//!
//! A chat backend with group and dialog conversations, a membership model
//! with self and admin status changes, and live delivery over WebSockets.
//!
//! # Module Structure
//!
//! - **`shared`** - wire and domain types (conversations, participants,
//!   messages, bus events) with their validation
//! - **`backend`** - the Axum server, stores, services and the realtime
//!   relay
//!
//! # Usage
//!
//! ```rust,no_run
//! use relaychat::backend::server::{create_app, load_database, ServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! let pool = load_database(&config).await?;
//! let (app, shutdown) = create_app(pool, config);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod shared;
