//! Wire protocol types for the PubSub endpoint.
//!
//! Outbound control frames are serialized from typed structs so the field
//! order on the wire stays stable. Inbound frames arrive as an envelope
//! whose `message` field is itself a JSON-encoded string carrying the
//! actual event.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Frame type tag carried by event envelopes.
pub const FRAME_TYPE_MESSAGE: &str = "MESSAGE";
/// Frame type tag for LISTEN acknowledgements.
pub const FRAME_TYPE_RESPONSE: &str = "RESPONSE";
/// Frame type tag for keep-alive replies.
pub const FRAME_TYPE_PONG: &str = "PONG";

#[derive(Debug, Serialize)]
struct ListenRequest<'a> {
    #[serde(rename = "type")]
    frame_type: &'a str,
    data: ListenData<'a>,
}

#[derive(Debug, Serialize)]
struct ListenData<'a> {
    topics: [&'a str; 1],
    auth_token: &'a str,
}

/// Builds the LISTEN control frame subscribing to `topic`.
pub fn listen_frame(topic: &str, auth_token: &str) -> String {
    serde_json::to_string(&ListenRequest {
        frame_type: "LISTEN",
        data: ListenData {
            topics: [topic],
            auth_token,
        },
    })
    .expect("serialize LISTEN frame")
}

/// Builds the keep-alive PING control frame.
pub fn ping_frame() -> String {
    json!({ "type": "PING" }).to_string()
}

/// Envelope shared by every inbound frame.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub data: Option<EnvelopeData>,
    /// RESPONSE frames report LISTEN failures here; empty means accepted.
    pub error: Option<String>,
}

/// Payload of MESSAGE envelopes: the topic plus a JSON-encoded event string.
#[derive(Debug, Deserialize)]
pub struct EnvelopeData {
    pub topic: String,
    pub message: String,
}

/// A decoded bits event as carried inside a MESSAGE payload.
#[derive(Debug, Clone, Deserialize)]
pub struct BitsEvent {
    pub chat_message: String,
    pub bits_used: u64,
    pub user_name: Option<String>,
    pub channel_id: Option<String>,
    pub context: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_frame_matches_wire_contract() {
        let frame = listen_frame("channel-bitsevents.44322889", "oauth-abc");
        assert_eq!(
            frame,
            r#"{"type":"LISTEN","data":{"topics":["channel-bitsevents.44322889"],"auth_token":"oauth-abc"}}"#
        );
    }

    #[test]
    fn ping_frame_matches_wire_contract() {
        assert_eq!(ping_frame(), r#"{"type":"PING"}"#);
    }

    #[test]
    fn envelope_decodes_a_bits_event_frame() {
        let payload = json!({
            "user_name": "dallasnchains",
            "channel_name": "twitch",
            "time": "2015-12-19T16:39:57-08:00",
            "chat_message": "Omg that baneling bust was Kreygasm CM16 cheer10 cheer10 cheer100",
            "bits_used": 120,
            "total_bits_used": 620,
            "context": "cheer"
        })
        .to_string();
        let frame = json!({
            "type": "MESSAGE",
            "data": {
                "topic": "channel-bitsevents.44322889",
                "message": payload
            }
        })
        .to_string();

        let envelope: Envelope = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope.frame_type, FRAME_TYPE_MESSAGE);

        let data = envelope.data.unwrap();
        assert_eq!(data.topic, "channel-bitsevents.44322889");

        let event: BitsEvent = serde_json::from_str(&data.message).unwrap();
        assert_eq!(event.bits_used, 120);
        assert_eq!(event.user_name.as_deref(), Some("dallasnchains"));
        assert!(event.chat_message.contains("CM16"));
    }

    #[test]
    fn envelope_tolerates_frames_without_data() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"type":"RESPONSE","error":"","nonce":""}"#).unwrap();
        assert_eq!(envelope.frame_type, FRAME_TYPE_RESPONSE);
        assert!(envelope.data.is_none());
        assert_eq!(envelope.error.as_deref(), Some(""));
    }

    #[test]
    fn malformed_event_payload_is_rejected() {
        let err = serde_json::from_str::<BitsEvent>(r#"{"chat_message": 3}"#);
        assert!(err.is_err());
    }
}
