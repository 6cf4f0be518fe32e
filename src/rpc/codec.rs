//! Strict JSON-RPC 2.0 framing: parsing and serializing requests, responses,
//! and error objects.
//!
//! Frames are plain [`serde_json::Value`] trees; this module only concerns
//! itself with the envelope (`jsonrpc`, `id`, `method`/`params` vs.
//! `result`/`error`). Method-specific parameter and result shapes live in
//! [`crate::mwa`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only supported `jsonrpc` version string.
const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes used by the core.
pub mod standard_error {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// A request `id`: a stable scalar chosen by the caller.
///
/// JSON-RPC permits numbers or strings; this core always emits numeric ids
/// (see [`crate::rpc::endpoint`]) but accepts either on the wire, since a
/// peer is free to use whichever it likes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// An inbound or outbound JSON-RPC 2.0 request frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// A JSON-RPC 2.0 response frame: exactly one of `result`/`error` is present.
#[derive(Clone, Debug)]
pub enum ResponseFrame {
    Ok { id: RequestId, result: Value },
    Err { id: RequestId, error: RpcErrorObject },
}

impl ResponseFrame {
    pub fn id(&self) -> &RequestId {
        match self {
            ResponseFrame::Ok { id, .. } => id,
            ResponseFrame::Err { id, .. } => id,
        }
    }
}

/// Raised while parsing a frame off the wire.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("missing or invalid `jsonrpc` field, expected \"2.0\"")]
    BadVersion,
    #[error("frame is neither a valid request nor a valid response")]
    UnrecognizedShape,
}

/// On-wire serde shape for a raw frame, used only internally to discriminate
/// between requests and responses before committing to a concrete type.
#[derive(Deserialize)]
struct RawFrame {
    jsonrpc: Option<String>,
    id: Option<RequestId>,
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Either half of a decoded frame: an inbound/outbound request, or a
/// response to a call this endpoint previously made.
pub enum DecodedFrame {
    Request(RequestFrame),
    Response(ResponseFrame),
}

/// Parses one JSON-RPC 2.0 frame (request or response).
///
/// Rejects the frame with [`ParseError::InvalidJson`] if `bytes` is not
/// valid JSON, and with [`ParseError::BadVersion`] if `jsonrpc` is not
/// exactly `"2.0"`.
pub fn parse_frame(bytes: &[u8]) -> Result<DecodedFrame, ParseError> {
    let raw: RawFrame = serde_json::from_slice(bytes)?;

    if raw.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
        return Err(ParseError::BadVersion);
    }

    match (raw.method, raw.id, raw.result, raw.error) {
        (Some(method), Some(id), None, None) => Ok(DecodedFrame::Request(RequestFrame {
            id,
            method,
            params: raw.params,
        })),
        (None, Some(id), Some(result), None) => {
            Ok(DecodedFrame::Response(ResponseFrame::Ok { id, result }))
        }
        (None, Some(id), None, Some(error)) => {
            Ok(DecodedFrame::Response(ResponseFrame::Err { id, error }))
        }
        _ => Err(ParseError::UnrecognizedShape),
    }
}

/// Serializes an outbound request frame to a JSON-RPC 2.0 byte string.
pub fn serialize_request(frame: &RequestFrame) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": frame.id,
        "method": frame.method,
        "params": frame.params,
    }))
    .expect("request frames are always serializable")
}

/// Serializes an outbound success response frame.
pub fn serialize_response_ok(id: &RequestId, result: Value) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    }))
    .expect("response frames are always serializable")
}

/// Serializes an outbound error response frame.
pub fn serialize_response_err(id: &RequestId, error: &RpcErrorObject) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": error,
    }))
    .expect("response frames are always serializable")
}

/// Serializes an error response with a null `id`, for frames so malformed
/// that no `id` could be recovered.
pub fn serialize_response_err_no_id(error: &RpcErrorObject) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": Value::Null,
        "error": error,
    }))
    .expect("response frames are always serializable")
}
