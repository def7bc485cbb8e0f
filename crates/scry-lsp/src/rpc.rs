//! JSON-RPC message shapes and reply construction.

use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// LSP error codes used by the handlers.
pub mod error_code {
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
}

/// A request id: integer, or a string carrying an integer.
///
/// String ids are re-emitted as strings spelling the parsed integer in
/// decimal, so `"007"` comes back as `"7"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestId {
    Int(i64),
    Str(i64),
}

impl RequestId {
    pub fn from_value(value: &Value) -> Option<RequestId> {
        match value {
            Value::Number(n) => n.as_i64().map(RequestId::Int),
            Value::String(s) => s.trim().parse::<i64>().ok().map(RequestId::Str),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RequestId::Int(n) => json!(n),
            RequestId::Str(n) => json!(n.to_string()),
        }
    }

    /// Stable textual form, used as the completion-manager request key.
    pub fn as_key(&self) -> String {
        match self {
            RequestId::Int(n) | RequestId::Str(n) => n.to_string(),
        }
    }
}

/// One parsed incoming message.
#[derive(Debug)]
pub struct Incoming {
    pub id: Option<RequestId>,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("jsonrpc version must be \"2.0\", got {0:?}")]
    WrongVersion(String),

    #[error("message has no method")]
    NoMethod,
}

/// Parses a message body. Wrong `jsonrpc` version and malformed JSON are
/// fatal per the framing contract; responses from the client (no `method`)
/// surface as `NoMethod` and are skipped by the caller.
pub fn parse_message(body: &str) -> Result<Incoming, RpcError> {
    let value: Value = serde_json::from_str(body)?;

    let version = value
        .get("jsonrpc")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if version != JSONRPC_VERSION {
        return Err(RpcError::WrongVersion(version.to_string()));
    }

    let method = value
        .get("method")
        .and_then(|m| m.as_str())
        .ok_or(RpcError::NoMethod)?
        .to_string();

    Ok(Incoming {
        id: value.get("id").and_then(RequestId::from_value),
        method,
        params: value.get("params").cloned().unwrap_or(Value::Null),
    })
}

pub fn response(id: &RequestId, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.to_value(),
        "result": result,
    })
}

pub fn error_response(id: &RequestId, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.to_value(),
        "error": { "code": code, "message": message.into() },
    })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_ids_round_trip_as_integers() {
        let incoming =
            parse_message(r#"{"jsonrpc":"2.0","id":3,"method":"shutdown"}"#).unwrap();
        assert_eq!(incoming.id, Some(RequestId::Int(3)));
        assert_eq!(incoming.id.unwrap().to_value(), json!(3));
    }

    #[test]
    fn string_ids_come_back_as_decimal_strings() {
        let incoming =
            parse_message(r#"{"jsonrpc":"2.0","id":"007","method":"shutdown"}"#).unwrap();
        let id = incoming.id.unwrap();
        assert_eq!(id, RequestId::Str(7));
        assert_eq!(id.to_value(), json!("7"));
    }

    #[test]
    fn wrong_version_is_fatal() {
        let err = parse_message(r#"{"jsonrpc":"1.0","method":"x"}"#).unwrap_err();
        assert!(matches!(err, RpcError::WrongVersion(_)));
    }

    #[test]
    fn malformed_json_is_fatal() {
        assert!(matches!(
            parse_message("{oops").unwrap_err(),
            RpcError::MalformedJson(_)
        ));
    }

    #[test]
    fn client_responses_are_skippable() {
        let err = parse_message(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap_err();
        assert!(matches!(err, RpcError::NoMethod));
    }
}
