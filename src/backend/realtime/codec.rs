//! Wire codec for the duplex connection
//!
//! Inbound frames are JSON chat sends:
//!
//! ```json
//! {"conversation_id": "...", "content": "hi", "content_type": "text/plain"}
//! ```
//!
//! Outbound frames are the bus envelope without its session bookkeeping:
//!
//! ```json
//! {"action": "send", "message": {...}}
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::shared::message::{validate_content, DEFAULT_CONTENT_TYPE};
use crate::shared::RealtimeEvent;

/// A chat send as written by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundFrame {
    pub conversation_id: Uuid,
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

/// Decode and validate one inbound payload
pub fn decode_inbound(payload: &[u8]) -> Result<InboundFrame, BackendError> {
    let frame: InboundFrame = serde_json::from_slice(payload)
        .map_err(|e| BackendError::protocol(format!("malformed frame: {}", e)))?;
    validate_content(&frame.content, &frame.content_type)
        .map_err(|e| BackendError::protocol(e.to_string()))?;
    Ok(frame)
}

/// Encode one bus event for the client
pub fn encode_outbound(event: &RealtimeEvent) -> Result<Bytes, BackendError> {
    Ok(Bytes::from(serde_json::to_vec(event)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::message::MAX_CONTENT_BYTES;
    use crate::shared::{BusAction, Message};
    use assert_matches::assert_matches;

    #[test]
    fn content_type_defaults_to_plain_text() {
        let conversation_id = Uuid::new_v4();
        let payload = serde_json::json!({"conversation_id": conversation_id, "content": "hi"});
        let frame = decode_inbound(payload.to_string().as_bytes()).unwrap();

        assert_eq!(frame.conversation_id, conversation_id);
        assert_eq!(frame.content_type, "text/plain");
    }

    #[test]
    fn malformed_frames_are_protocol_errors() {
        assert_matches!(decode_inbound(b"not json"), Err(BackendError::ProtocolError { .. }));

        let unknown_field = serde_json::json!({
            "conversation_id": Uuid::new_v4(),
            "content": "hi",
            "sender_id": Uuid::new_v4(),
        });
        assert_matches!(
            decode_inbound(unknown_field.to_string().as_bytes()),
            Err(BackendError::ProtocolError { .. })
        );
    }

    #[test]
    fn invalid_content_is_a_protocol_error() {
        let conversation_id = Uuid::new_v4();
        let empty = serde_json::json!({"conversation_id": conversation_id, "content": "  "});
        assert_matches!(
            decode_inbound(empty.to_string().as_bytes()),
            Err(BackendError::ProtocolError { .. })
        );

        let oversized = serde_json::json!({
            "conversation_id": conversation_id,
            "content": "x".repeat(MAX_CONTENT_BYTES + 1),
        });
        assert_matches!(
            decode_inbound(oversized.to_string().as_bytes()),
            Err(BackendError::ProtocolError { .. })
        );
    }

    #[test]
    fn outbound_frame_omits_origin_session() {
        let message = Message::chat(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "hi".to_string(),
            DEFAULT_CONTENT_TYPE.to_string(),
        );
        let event = RealtimeEvent::send(message, Uuid::new_v4());

        let bytes = encode_outbound(&event).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["action"], "send");
        assert_eq!(json["message"]["content"], "hi");
        assert!(json.get("origin_session").is_none());
        assert_eq!(
            serde_json::from_value::<BusAction>(json["action"].clone()).unwrap(),
            BusAction::Send
        );
    }
}
