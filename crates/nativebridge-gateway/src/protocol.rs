//! JSON-RPC 2.0 envelopes for the external endpoint.

use nativebridge_router::codes;
use serde_json::{json, Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const CONTENT_TYPE_TEXT: &str = "text";

/// Returned when `tools/call` names an unregistered capability.
pub const CAPABILITY_NOT_FOUND: i64 = -32002;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JsonRpcRequest {
    /// `None` marks a notification.
    pub id: Option<Value>,
    pub method: String,
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DispatchError {
    pub id: Value,
    pub code: i64,
    pub message: String,
}

impl DispatchError {
    pub fn new(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            code,
            message: message.into(),
        }
    }

    pub fn into_frame(self) -> Value {
        error_frame(self.id, self.code, self.message)
    }
}

pub(crate) fn parse_request(value: &Value) -> Result<JsonRpcRequest, DispatchError> {
    let Some(object) = value.as_object() else {
        return Err(DispatchError::new(
            Value::Null,
            codes::INVALID_REQUEST,
            "jsonrpc request must be an object",
        ));
    };
    let id = object.get("id").cloned();
    let reply_id = id.clone().unwrap_or(Value::Null);

    let version = object
        .get("jsonrpc")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if version != JSONRPC_VERSION {
        return Err(DispatchError::new(
            reply_id,
            codes::INVALID_REQUEST,
            format!("jsonrpc must be '{JSONRPC_VERSION}'"),
        ));
    }

    let method = object
        .get("method")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|method| !method.is_empty())
        .ok_or_else(|| {
            DispatchError::new(
                reply_id.clone(),
                codes::INVALID_REQUEST,
                "jsonrpc request must include non-empty method",
            )
        })?;

    let params = match object.get("params") {
        Some(Value::Object(params)) => params.clone(),
        Some(Value::Null) | None => Map::new(),
        Some(_) => {
            return Err(DispatchError::new(
                reply_id,
                codes::INVALID_PARAMS,
                "jsonrpc request params must be an object",
            ))
        }
    };

    Ok(JsonRpcRequest {
        id,
        method: method.to_string(),
        params,
    })
}

pub(crate) fn result_frame(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

pub(crate) fn error_frame(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": code,
            "message": message.into(),
        },
    })
}

/// Wrap a capability outcome as a `tools/call` result.
pub(crate) fn tool_call_result(content: Value, is_error: bool) -> Value {
    let text = match &content {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other)
            .unwrap_or_else(|_| "{\"error\":\"failed to serialize capability result\"}".to_string()),
    };
    let mut result = json!({
        "content": [{
            "type": CONTENT_TYPE_TEXT,
            "text": text,
        }],
        "isError": is_error,
    });
    if content.is_object() {
        result["structuredContent"] = content;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_id_is_a_notification() {
        let request = parse_request(&json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        assert_eq!(request.id, None);
        assert!(request.params.is_empty());
    }

    #[test]
    fn wrong_version_keeps_the_id() {
        let err = parse_request(&json!({"jsonrpc": "1.0", "id": 7, "method": "ping"})).unwrap_err();
        assert_eq!(err.id, json!(7));
        assert_eq!(err.code, codes::INVALID_REQUEST);
    }

    #[test]
    fn non_object_params_are_invalid_params() {
        let err = parse_request(&json!({
            "jsonrpc": "2.0", "id": "a", "method": "tools/call", "params": [1, 2]
        }))
        .unwrap_err();
        assert_eq!(err.code, codes::INVALID_PARAMS);
        assert_eq!(err.id, json!("a"));
    }

    #[test]
    fn non_object_body_is_invalid_request() {
        let err = parse_request(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.id, Value::Null);
        assert_eq!(err.code, codes::INVALID_REQUEST);
    }

    #[test]
    fn tool_results_carry_text_and_structure() {
        let ok = tool_call_result(json!({"tabs": 3}), false);
        assert_eq!(ok["isError"], json!(false));
        assert_eq!(ok["content"][0]["type"], json!("text"));
        assert_eq!(ok["structuredContent"]["tabs"], json!(3));

        let failed = tool_call_result(json!("request timed out"), true);
        assert_eq!(failed["isError"], json!(true));
        assert_eq!(failed["content"][0]["text"], json!("request timed out"));
        assert!(failed.get("structuredContent").is_none());
    }
}
