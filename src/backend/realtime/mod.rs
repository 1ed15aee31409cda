//! Real-time Delivery
//!
//! ```text
//! realtime/
//! ├── mod.rs        - Module exports and documentation
//! ├── bus.rs        - Per-conversation fan-out (MessageBus, Subscriber)
//! ├── codec.rs      - JSON wire frames
//! ├── relay.rs      - Session state machine and its IO seams
//! ├── transport.rs  - WebSocket implementations of the IO seams
//! └── handler.rs    - GET /ws upgrade
//! ```
//!
//! Delivery is at-most-once: a subscriber that falls more than the topic
//! capacity behind skips the events it missed. Durable history is out of
//! scope; clients that care reload through the REST API.

pub mod bus;
pub mod codec;
pub mod handler;
pub mod relay;
pub mod transport;

pub use bus::{MessageBus, Subscriber};
pub use codec::{decode_inbound, encode_outbound, InboundFrame};
pub use handler::handle_ws_connect;
pub use relay::{
    is_self_echo, Authenticator, CloseReason, FrameReader, FrameWriter, SessionRelay,
    SessionReport, SessionState, TopicDirectory,
};
pub use transport::{WsReader, WsWriter};
