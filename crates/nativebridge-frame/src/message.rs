use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Correlation token carried by calls and their responses.
///
/// The counterpart may use numbers or strings; the same JSON form is echoed
/// back on the response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(u64),
    Text(String),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Number(n) => write!(f, "{n}"),
            MessageId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for MessageId {
    fn from(value: u64) -> Self {
        MessageId::Number(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        MessageId::Text(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        MessageId::Text(value)
    }
}

/// Error shape carried in a response: `{code, message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// The native-channel envelope.
///
/// Which fields are set decides the message kind; see [`Message::into_inbound`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    // `present` keeps an explicit `"result": null` distinct from a missing field.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Set when the payload was valid JSON but not a valid envelope.
    #[serde(skip)]
    pub defect: Option<Defect>,
}

/// Why a syntactically valid payload could not be read as a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defect {
    pub detail: String,
    /// The payload named a `method`, so it was meant as a call.
    pub call: bool,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn usable_id(raw: &Value) -> Option<MessageId> {
    match raw {
        Value::Number(n) => n.as_u64().map(MessageId::Number),
        Value::String(s) => Some(MessageId::Text(s.clone())),
        _ => None,
    }
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The counterpart asks this side to run `method`.
    Call {
        id: MessageId,
        method: String,
        params: Option<Value>,
    },
    /// Settles one of this side's outstanding calls.
    Response {
        id: MessageId,
        outcome: std::result::Result<Value, ErrorObject>,
    },
    /// Carries an id but violates the result-xor-error rule.
    MalformedResponse { id: MessageId, reason: &'static str },
    /// A call whose envelope is unreadable; answered with an error.
    InvalidCall { id: MessageId, reason: &'static str },
    /// Fire-and-forget message keyed by `type`.
    Notification {
        msg_type: String,
        payload: Option<Value>,
    },
    /// Nothing routable.
    Invalid { reason: &'static str },
}

impl Message {
    /// Build an outbound call.
    pub fn call(id: MessageId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: Some(id),
            method: Some(method.into()),
            params,
            ..Self::default()
        }
    }

    /// Build a response; the `Result` makes result-xor-error hold by construction.
    pub fn response(id: MessageId, outcome: std::result::Result<Value, ErrorObject>) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            id: Some(id),
            result,
            error,
            ..Self::default()
        }
    }

    /// Build a notification.
    pub fn notification(msg_type: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            msg_type: Some(msg_type.into()),
            payload,
            ..Self::default()
        }
    }

    /// Parse a frame payload.
    ///
    /// Only a JSON syntax error fails. A payload of the wrong shape comes
    /// back with [`Message::defect`] set.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)?;
        Ok(Self::from_value(&value))
    }

    /// Read an envelope out of an already-parsed JSON value.
    pub fn from_value(value: &Value) -> Self {
        match Message::deserialize(value) {
            Ok(message) => message,
            Err(err) => Self {
                id: value.get("id").and_then(usable_id),
                defect: Some(Defect {
                    detail: err.to_string(),
                    call: value.get("method").is_some(),
                }),
                ..Self::default()
            },
        }
    }

    /// Classify the message.
    ///
    /// `method` makes a call, `result`/`error` make a response, `type` makes a
    /// notification. An id with none of these is a malformed response.
    pub fn into_inbound(self) -> Inbound {
        let Message {
            msg_type,
            id,
            method,
            params,
            result,
            error,
            payload,
            defect,
        } = self;

        if let Some(defect) = defect {
            return match (id, defect.call) {
                (Some(id), true) => Inbound::InvalidCall {
                    id,
                    reason: "call does not match the message envelope",
                },
                (Some(id), false) => Inbound::MalformedResponse {
                    id,
                    reason: "response does not match the message envelope",
                },
                (None, _) => Inbound::Invalid {
                    reason: "payload does not match the message envelope",
                },
            };
        }

        if let Some(method) = method {
            return match id {
                Some(id) => Inbound::Call { id, method, params },
                None => Inbound::Invalid {
                    reason: "call without id",
                },
            };
        }

        let settled = match (result, error) {
            (None, None) => None,
            (Some(_), Some(_)) => Some(Err("response carries both result and error")),
            (Some(value), None) => Some(Ok(Ok(value))),
            (None, Some(err)) => Some(Ok(Err(err))),
        };
        if let Some(settled) = settled {
            let Some(id) = id else {
                return Inbound::Invalid {
                    reason: "response without id",
                };
            };
            return match settled {
                Ok(outcome) => Inbound::Response { id, outcome },
                Err(reason) => Inbound::MalformedResponse { id, reason },
            };
        }

        if let Some(msg_type) = msg_type {
            return Inbound::Notification { msg_type, payload };
        }

        match id {
            Some(id) => Inbound::MalformedResponse {
                id,
                reason: "response carries neither result nor error",
            },
            None => Inbound::Invalid {
                reason: "no method, result, error, or type",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(raw: &str) -> Inbound {
        Message::from_slice(raw.as_bytes()).unwrap().into_inbound()
    }

    #[test]
    fn classifies_call() {
        assert_eq!(
            parse(r#"{"id":"a1","method":"status","params":{"x":1}}"#),
            Inbound::Call {
                id: MessageId::from("a1"),
                method: "status".to_string(),
                params: Some(json!({"x": 1})),
            }
        );
    }

    #[test]
    fn call_without_id_is_invalid() {
        assert!(matches!(
            parse(r#"{"method":"status"}"#),
            Inbound::Invalid { .. }
        ));
    }

    #[test]
    fn explicit_null_result_is_a_response() {
        assert_eq!(
            parse(r#"{"id":7,"result":null}"#),
            Inbound::Response {
                id: MessageId::Number(7),
                outcome: Ok(Value::Null),
            }
        );
    }

    #[test]
    fn error_response_keeps_code_and_message() {
        let inbound = parse(r#"{"id":7,"error":{"code":-32000,"message":"tab gone"}}"#);
        let Inbound::Response { outcome, .. } = inbound else {
            panic!("expected response");
        };
        let err = outcome.unwrap_err();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "tab gone");
    }

    #[test]
    fn both_result_and_error_is_malformed() {
        assert!(matches!(
            parse(r#"{"id":3,"result":1,"error":{"code":1,"message":"x"}}"#),
            Inbound::MalformedResponse { id: MessageId::Number(3), .. }
        ));
    }

    #[test]
    fn bare_id_is_malformed() {
        assert!(matches!(
            parse(r#"{"id":3}"#),
            Inbound::MalformedResponse { .. }
        ));
    }

    #[test]
    fn wrong_shape_with_id_is_malformed_response() {
        let message = Message::from_slice(br#"{"id":1,"error":"boom"}"#).unwrap();
        assert!(message.defect.is_some());
        assert_eq!(
            message.into_inbound(),
            Inbound::MalformedResponse {
                id: MessageId::Number(1),
                reason: "response does not match the message envelope",
            }
        );
    }

    #[test]
    fn wrong_shape_call_keeps_its_id() {
        assert!(matches!(
            parse(r#"{"id":"c1","method":42}"#),
            Inbound::InvalidCall { id: MessageId::Text(ref id), .. } if id == "c1"
        ));
    }

    #[test]
    fn wrong_shape_without_usable_id_is_invalid() {
        for raw in [
            r#"{"type":"ping","id":-5}"#,
            r#"{"type":7}"#,
            r#"{"id":1.5,"result":1}"#,
            r#"[1,2,3]"#,
            r#""just a string""#,
        ] {
            assert!(
                matches!(parse(raw), Inbound::Invalid { .. }),
                "{raw} should be invalid"
            );
        }
    }

    #[test]
    fn syntax_error_still_fails() {
        assert!(matches!(
            Message::from_slice(b"{not json"),
            Err(crate::error::FrameError::InvalidJson(_))
        ));
    }

    #[test]
    fn classifies_notification_with_payload() {
        assert_eq!(
            parse(r#"{"type":"start","payload":{"port":8080}}"#),
            Inbound::Notification {
                msg_type: "start".to_string(),
                payload: Some(json!({"port": 8080})),
            }
        );
    }

    #[test]
    fn serialization_omits_unset_fields() {
        let text = serde_json::to_string(&Message::notification("pong", None)).unwrap();
        assert_eq!(text, r#"{"type":"pong"}"#);

        let text =
            serde_json::to_string(&Message::response(MessageId::Number(2), Ok(Value::Null)))
                .unwrap();
        assert_eq!(text, r#"{"id":2,"result":null}"#);
    }

    #[test]
    fn id_echoes_in_original_json_form() {
        let message = Message::response(MessageId::from("req-9"), Ok(json!(true)));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["id"], json!("req-9"));
    }
}
