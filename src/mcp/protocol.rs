//! JSON-RPC 2.0 framing for MCP.
//!
//! The server only ever receives requests and notifications and only ever
//! sends responses, so the types here are split along that line: incoming
//! types deserialize, outgoing types serialize.
//!
//! MCP narrows JSON-RPC slightly: request ids are strings or integers,
//! never `null`, and batches are not used.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "schematic-layout-mcp";

const JSONRPC_VERSION: &str = "2.0";

/// A request id. MCP forbids `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A request: has an id and expects exactly one reply.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Request id, echoed in the reply.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// A notification: no id, never answered.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Notification name.
    pub method: String,
    /// Notification parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// A message read from the client.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Expects a response.
    Request(JsonRpcRequest),
    /// Fire and forget.
    Notification(JsonRpcNotification),
}

/// Envelope used to classify a message before committing to a shape.
#[derive(Deserialize)]
struct Envelope {
    jsonrpc: Option<String>,
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

/// Keeps an explicit `null` as `Some(Value::Null)` so it is not mistaken
/// for a missing id.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Parses one line of input.
///
/// # Errors
///
/// Returns a parse error for malformed JSON and an invalid-request error for
/// JSON that is not a JSON-RPC 2.0 request or notification. The error carries
/// the request id when one could be read.
pub fn parse_message(line: &str) -> Result<IncomingMessage, JsonRpcError> {
    let envelope: Envelope = serde_json::from_str(line).map_err(|e| {
        if e.is_data() {
            JsonRpcError::invalid_request(None)
        } else {
            JsonRpcError::parse_error()
        }
    })?;

    let id = match envelope.id {
        None => None,
        Some(raw) => Some(
            serde_json::from_value::<RequestId>(raw)
                .map_err(|_| JsonRpcError::invalid_request(None))?,
        ),
    };

    let method = match envelope.method {
        Some(m) if !m.is_empty() && envelope.jsonrpc.as_deref() == Some(JSONRPC_VERSION) => m,
        _ => return Err(JsonRpcError::invalid_request(id)),
    };

    Ok(match id {
        Some(id) => IncomingMessage::Request(JsonRpcRequest {
            id,
            method,
            params: envelope.params,
        }),
        None => IncomingMessage::Notification(JsonRpcNotification {
            method,
            params: envelope.params,
        }),
    })
}

/// A successful reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    /// Id of the request being answered.
    pub id: RequestId,
    /// Method result.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a success reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes used by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON.
    ParseError,
    /// Valid JSON, but not a request.
    InvalidRequest,
    /// Unknown method.
    MethodNotFound,
    /// Parameters did not match the method.
    InvalidParams,
    /// The server failed to produce a result.
    InternalError,
}

impl ErrorCode {
    /// Numeric code sent on the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }
}

/// The `error` member of an error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// Numeric code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

/// An error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    jsonrpc: &'static str,
    /// Id of the failed request; `null` when it could not be read.
    pub id: Option<RequestId>,
    /// Error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    fn new(id: Option<RequestId>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error: JsonRpcErrorData {
                code: code.code(),
                message: message.into(),
            },
        }
    }

    /// The input was not JSON.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, ErrorCode::ParseError, "Parse error")
    }

    /// The input was JSON but not a JSON-RPC 2.0 message.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, ErrorCode::InvalidRequest, "Invalid Request")
    }

    /// No such method.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            ErrorCode::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    /// Parameters missing or malformed.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(Some(id), ErrorCode::InvalidParams, message)
    }

    /// A request arrived before the initialisation handshake finished.
    #[must_use]
    pub fn not_initialised(id: RequestId) -> Self {
        Self::new(Some(id), ErrorCode::InvalidRequest, "Server not initialised")
    }

    /// A second `initialize` request.
    #[must_use]
    pub fn already_initialised(id: RequestId) -> Self {
        Self::new(Some(id), ErrorCode::InvalidRequest, "Server already initialised")
    }

    /// The server failed while handling a valid request.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(Some(id), ErrorCode::InternalError, message)
    }
}
