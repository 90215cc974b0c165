use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::transfer::PlainValue;

/// A reconstructed language-level error: its message plus any structured
/// extra fields it carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// A structured RPC error with a numeric code, shipped back to request
/// callers when the remote method faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ResponseError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The closed set of runtime values the codec can ship across a channel.
///
/// Each encodable kind is an explicit variant; the registry predicates
/// match on them.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    /// An absent value.
    Undefined,
    /// A language-level error.
    Error(RemoteError),
    /// A structured protocol error with a numeric code.
    ResponseError(ResponseError),
    /// A byte-array view; decoding always yields a private copy.
    ByteArray(Vec<u8>),
    /// A raw binary buffer.
    Buffer(Bytes),
    /// A sequence of values, e.g. an argument list.
    Array(Vec<RpcValue>),
    /// Any JSON-compatible value, including transferable composites.
    Json(PlainValue),
}

impl RpcValue {
    /// Short kind name, used in error reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcValue::Undefined => "undefined",
            RpcValue::Error(_) => "error",
            RpcValue::ResponseError(_) => "response-error",
            RpcValue::ByteArray(_) => "byte-array",
            RpcValue::Buffer(_) => "buffer",
            RpcValue::Array(_) => "array",
            RpcValue::Json(_) => "json",
        }
    }

    /// Convenience constructor for JSON-compatible values.
    pub fn json(value: impl Into<PlainValue>) -> Self {
        RpcValue::Json(value.into())
    }

    /// Borrow the inner JSON value if this is the JSON kind.
    pub fn as_json(&self) -> Option<&PlainValue> {
        match self {
            RpcValue::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Interpret this value as an i64 if it is a JSON number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RpcValue::Json(PlainValue::Number(n)) => n.as_i64(),
            _ => None,
        }
    }
}

impl From<PlainValue> for RpcValue {
    fn from(value: PlainValue) -> Self {
        RpcValue::Json(value)
    }
}
