use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorObject;

/// Protocol version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Call identifier. Integers are what this crate allocates; strings are
/// accepted from peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Num(i64),
    Str(String),
}

impl Id {
    /// The id as an unsigned counter value, if it is a non-negative integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Id::Num(n) => u64::try_from(*n).ok(),
            Id::Str(_) => None,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Id::Num(n) => Value::from(*n),
            Id::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Num(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::Str(value.to_string())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Num(n) => write!(f, "{n}"),
            Id::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Request/notification parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    #[default]
    None,
    Array(Vec<Value>),
    Object(Map<String, Value>),
}

impl Params {
    /// Named parameter lookup. Positional params have no names.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Params::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Params::None => true,
            Params::Array(items) => items.is_empty(),
            Params::Object(map) => map.is_empty(),
        }
    }

    /// JSON form, `None` when there are no params to send.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Params::None => None,
            Params::Array(items) => Some(Value::Array(items.clone())),
            Params::Object(map) => Some(Value::Object(map.clone())),
        }
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Params::Object(map)
    }
}

/// A single message unit exchanged over the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request {
        id: Id,
        method: String,
        params: Params,
    },
    Notification {
        method: String,
        params: Params,
    },
    Success {
        id: Id,
        result: Value,
    },
    Error {
        id: Option<Id>,
        error: ErrorObject,
    },
}

impl Envelope {
    /// Correlation id, if the envelope carries one.
    pub fn id(&self) -> Option<&Id> {
        match self {
            Envelope::Request { id, .. } | Envelope::Success { id, .. } => Some(id),
            Envelope::Error { id, .. } => id.as_ref(),
            Envelope::Notification { .. } => None,
        }
    }

    /// Short kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Request { .. } => "request",
            Envelope::Notification { .. } => "notification",
            Envelope::Success { .. } => "success",
            Envelope::Error { .. } => "error",
        }
    }

    /// True for success and error envelopes.
    pub fn is_completion(&self) -> bool {
        matches!(self, Envelope::Success { .. } | Envelope::Error { .. })
    }

    /// Wire representation including the `jsonrpc` tag.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        match self {
            Envelope::Request { id, method, params } => {
                obj.insert("id".into(), id.to_value());
                obj.insert("method".into(), Value::from(method.as_str()));
                if let Some(params) = params.to_value() {
                    obj.insert("params".into(), params);
                }
            }
            Envelope::Notification { method, params } => {
                obj.insert("method".into(), Value::from(method.as_str()));
                if let Some(params) = params.to_value() {
                    obj.insert("params".into(), params);
                }
            }
            Envelope::Success { id, result } => {
                obj.insert("id".into(), id.to_value());
                obj.insert("result".into(), result.clone());
            }
            Envelope::Error { id, error } => {
                obj.insert("id".into(), id.as_ref().map_or(Value::Null, Id::to_value));
                obj.insert(
                    "error".into(),
                    serde_json::to_value(error).unwrap_or(Value::Null),
                );
            }
        }
        Value::Object(obj)
    }
}

/// Serialize an envelope to wire text.
pub fn encode(envelope: &Envelope) -> String {
    envelope.to_value().to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn request_omits_empty_params() {
        let env = Envelope::Request {
            id: Id::Num(7),
            method: "get_jedec_id".into(),
            params: Params::None,
        };
        let value: Value = serde_json::from_str(&encode(&env)).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 7, "method": "get_jedec_id"})
        );
    }

    #[test]
    fn error_without_id_serializes_null_id() {
        let env = Envelope::Error {
            id: None,
            error: ErrorObject::new(ErrorCode::ParseError, "Parse error"),
        };
        assert_eq!(
            env.to_value(),
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}})
        );
        assert!(env.id().is_none());
        assert!(env.is_completion());
    }

    #[test]
    fn falsy_result_is_kept() {
        let env = Envelope::Success {
            id: Id::Str("abc".into()),
            result: json!(false),
        };
        assert_eq!(env.to_value()["result"], json!(false));
        assert_eq!(env.kind(), "success");
    }

    #[test]
    fn id_counter_view() {
        assert_eq!(Id::Num(3).as_u64(), Some(3));
        assert_eq!(Id::Num(-1).as_u64(), None);
        assert_eq!(Id::from("x").as_u64(), None);
    }

    #[test]
    fn params_lookup_is_by_name_only() {
        let mut map = Map::new();
        map.insert("block_id".into(), json!(4));
        let params = Params::from(map);
        assert_eq!(params.get("block_id"), Some(&json!(4)));
        assert!(Params::Array(vec![json!(4)]).get("block_id").is_none());
        assert!(Params::None.is_empty());
    }
}
