//! WebSocket wire codec.
//!
//! Inbound frames are JSON objects discriminated by `type`; payload
//! fields use camelCase on the wire. Unrecognized types are surfaced as
//! `Decoded::Unknown` so the connection can echo an error without
//! closing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sqlpilot_core::types::FunctionMode;

/// Inbound client frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    GenerateSql {
        mode: FunctionMode,
        payload: GeneratePayload,
        #[serde(rename = "requestId")]
        request_id: String,
    },
    CancelRequest {
        #[serde(rename = "requestId")]
        request_id: String,
    },
}

/// Payload of a `generate_sql` frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePayload {
    pub natural_language: String,
    pub dialect: String,
    #[serde(default)]
    pub cvrs_id: Option<String>,
    #[serde(default)]
    pub cvrs_seq: i64,
    #[serde(default)]
    pub schema_data: Option<Value>,
}

/// Outbound server frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AiResponse {
        payload: AiResponsePayload,
        #[serde(rename = "requestId")]
        request_id: String,
    },
    Error {
        message: String,
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

/// Payload of an `ai_response` frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponsePayload {
    pub mode: FunctionMode,
    pub response_text: String,
    pub cvrs_id: String,
    pub cvrs_seq: i64,
}

/// Result of decoding one inbound text frame.
#[derive(Debug)]
pub enum Decoded {
    Known(ClientMessage),
    /// Well-formed JSON with an unrecognized `type`.
    Unknown {
        msg_type: String,
        request_id: Option<String>,
    },
    /// Not valid JSON, or a known type with a bad shape. Carries the
    /// frame's requestId whenever one could still be read, so the error
    /// echo can retire the right pending request.
    Invalid {
        reason: String,
        request_id: Option<String>,
    },
}

/// Decode one inbound text frame.
pub fn decode(text: &str) -> Decoded {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            return Decoded::Invalid {
                reason: format!("invalid JSON: {}", e),
                request_id: None,
            }
        }
    };

    let request_id = value
        .get("requestId")
        .and_then(Value::as_str)
        .map(str::to_string);

    let msg_type = match value.get("type").and_then(Value::as_str) {
        Some(t) => t.to_string(),
        None => {
            return Decoded::Invalid {
                reason: "missing message type".to_string(),
                request_id,
            }
        }
    };

    match msg_type.as_str() {
        "generate_sql" | "cancel_request" => match serde_json::from_value(value) {
            Ok(message) => Decoded::Known(message),
            Err(e) => Decoded::Invalid {
                reason: format!("malformed {} message: {}", msg_type, e),
                request_id,
            },
        },
        _ => Decoded::Unknown {
            msg_type,
            request_id,
        },
    }
}

/// Serialize one outbound frame to its wire text.
pub fn encode(message: &ServerMessage) -> String {
    // ServerMessage has no non-serializable fields; failure here would
    // be a programming error, so fall back to a minimal literal.
    serde_json::to_string(message).unwrap_or_else(|_| {
        "{\"type\":\"error\",\"message\":\"internal serialization failure\"}".to_string()
    })
}

// =============================================================================
// Tests
// =============================================================================
