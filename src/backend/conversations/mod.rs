//! Conversations Module
//!
//! Creating dialogs and groups, and membership-gated lookup.

pub mod handlers;
pub mod service;
pub mod store;

pub use service::ConversationService;
pub use store::ConversationStore;
