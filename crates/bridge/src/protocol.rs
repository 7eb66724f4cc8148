//! Wire format between the bridge and the in-app client
//!
//! Both directions are JSON text frames. Requests carry an id chosen by the
//! caller; the app echoes it back on the response together with either a
//! base64 PNG payload or an error message.
//!
//! ```text
//! bridge -> app   {"id":"7f..","type":"capture_screenshot","payload":{"name":"home"}}
//! app -> bridge   {"id":"7f..","payload":"iVBORw0KGgo..."}
//! app -> bridge   {"id":"7f..","error":"view not mounted"}
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Commands understood by the in-app client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    CaptureScreenshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(rename = "type")]
    pub command: Command,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Request {
    pub fn capture(id: impl Into<String>, name: &str) -> Self {
        Self {
            id: id.into(),
            command: Command::CaptureScreenshot,
            payload: serde_json::json!({ "name": name }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: impl Into<String>, image: &[u8]) -> Self {
        Self {
            id: id.into(),
            payload: Some(STANDARD.encode(image)),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: None,
            error: Some(message.into()),
        }
    }

    /// Decoded image bytes, or the error the app reported
    pub fn into_result(self) -> BridgeResult<Vec<u8>> {
        if let Some(message) = self.error {
            return Err(BridgeError::App(message));
        }

        let payload = self
            .payload
            .ok_or_else(|| BridgeError::Protocol(format!("response {} has no payload", self.id)))?;

        STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| BridgeError::Protocol(format!("response {}: bad base64: {}", self.id, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_envelope_shape() {
        let json = serde_json::to_value(Request::capture("42", "home")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "42",
                "type": "capture_screenshot",
                "payload": { "name": "home" }
            })
        );
    }

    #[test]
    fn test_response_payload_decodes() {
        let raw = serde_json::to_string(&Response::ok("1", b"\x89PNG")).unwrap();
        let response: Response = serde_json::from_str(&raw).unwrap();
        assert_eq!(response.into_result().unwrap(), b"\x89PNG".to_vec());
    }

    #[test]
    fn test_response_error_and_empty() {
        let response: Response =
            serde_json::from_str(r#"{"id":"1","error":"view not mounted"}"#).unwrap();
        assert!(matches!(response.into_result(), Err(BridgeError::App(m)) if m == "view not mounted"));

        let response: Response = serde_json::from_str(r#"{"id":"1"}"#).unwrap();
        assert!(matches!(response.into_result(), Err(BridgeError::Protocol(_))));
    }
}
