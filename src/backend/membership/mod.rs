//! Membership Module
//!
//! Who belongs to which conversation, and who may change that.
//!
//! # Module Structure
//!
//! ```text
//! membership/
//! ├── mod.rs           - Module exports
//! ├── store.rs         - MembershipStore trait and get-then-update
//! ├── status_matrix.rs - Legal status transitions per actor role
//! ├── service.rs       - ParticipantService (permissions + orchestration)
//! ├── events.rs        - Participant events and sinks
//! └── handlers.rs      - REST handlers
//! ```

pub mod events;
pub mod handlers;
pub mod service;
pub mod status_matrix;
pub mod store;

pub use events::{BusEventSink, EventSink, ParticipantEvent, ParticipantEventKind};
pub use service::ParticipantService;
pub use status_matrix::{check_transition, ActorRole, StatusMatrix, ADMIN_MATRIX, SELF_MATRIX};
pub use store::MembershipStore;
