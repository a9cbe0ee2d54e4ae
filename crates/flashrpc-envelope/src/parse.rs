use serde_json::{Map, Value};

use crate::builder::{check_error_object, check_id, check_method, type_name, wrap_params};
use crate::envelope::{Envelope, Id, JSONRPC_VERSION};
use crate::error::{EnvelopeError, Result, ValidationErrors};
use crate::hook;

/// Parse wire text into an envelope.
///
/// Malformed JSON is [`EnvelopeError::Parse`]; JSON that is not a conforming
/// envelope is [`EnvelopeError::InvalidRequest`].
pub fn parse(text: &str) -> Result<Envelope> {
    let value: Value = serde_json::from_str(text)?;
    classify(value)
}

/// Parse a frame payload into an envelope.
pub fn parse_slice(bytes: &[u8]) -> Result<Envelope> {
    let value: Value = serde_json::from_slice(bytes)?;
    classify(value)
}

fn classify(value: Value) -> Result<Envelope> {
    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(invalid(vec![format!(
                "envelope must be an object, got {}",
                type_name(&other)
            )]))
        }
    };

    let mut errors = Vec::new();
    match obj.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(other) => errors.push(format!("jsonrpc must be \"2.0\", got {other}")),
        None => errors.push("jsonrpc is required".to_string()),
    }

    let envelope = structural_kind(&obj, &mut errors);
    match envelope {
        Some(envelope) if errors.is_empty() => Ok(envelope),
        _ => Err(invalid(errors)),
    }
}

/// Decide the kind by which members are present: a `method` makes it a
/// request (with `id`) or notification (without), otherwise `result` makes
/// it a success and `error` an error.
fn structural_kind(obj: &Map<String, Value>, errors: &mut Vec<String>) -> Option<Envelope> {
    let has_id = obj.contains_key("id");
    let has_result = obj.contains_key("result");
    let has_error = obj.contains_key("error");

    if obj.contains_key("method") {
        let method = check_method(obj.get("method"), errors);
        let params = wrap_params(obj.get("params"));
        if has_id {
            let id = check_id(obj.get("id"), errors);
            return Some(Envelope::Request {
                id: id?,
                method: method?,
                params,
            });
        }
        return Some(Envelope::Notification {
            method: method?,
            params,
        });
    }

    match (has_result, has_error) {
        (true, true) => {
            errors.push("exactly one of result or error must be present".to_string());
            None
        }
        (true, false) => {
            let id = check_id(obj.get("id"), errors);
            Some(Envelope::Success {
                id: id?,
                result: obj.get("result").cloned().unwrap_or(Value::Null),
            })
        }
        (false, true) => {
            let id: Option<Id> = match obj.get("id") {
                None | Some(Value::Null) => None,
                Some(value) => Some(check_id(Some(value), errors)?),
            };
            let error = check_error_object(obj.get("error"), errors);
            Some(Envelope::Error { id, error: error? })
        }
        (false, false) => {
            errors.push("envelope has none of method, result or error".to_string());
            None
        }
    }
}

fn invalid(messages: Vec<String>) -> EnvelopeError {
    let errors = ValidationErrors(messages);
    hook::report(&errors);
    EnvelopeError::InvalidRequest(errors)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::envelope::{encode, Params};
    use crate::error::ErrorObject;

    #[test]
    fn malformed_text_is_parse_error() {
        let err = parse("{\"jsonrpc\":").unwrap_err();
        assert!(matches!(err, EnvelopeError::Parse(_)));
        assert_eq!(err.to_error_object().code, -32700);
    }

    #[test]
    fn non_object_is_invalid_request() {
        let err = parse("[1,2,3]").unwrap_err();
        match err {
            EnvelopeError::InvalidRequest(errors) => {
                assert_eq!(errors.messages(), ["envelope must be an object, got array"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_or_wrong_version_is_rejected() {
        assert!(matches!(
            parse(r#"{"id":1,"result":true}"#),
            Err(EnvelopeError::InvalidRequest(_))
        ));
        assert!(matches!(
            parse(r#"{"jsonrpc":"1.0","id":1,"result":true}"#),
            Err(EnvelopeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn classifies_request_and_notification_by_id() {
        let req = parse(r#"{"jsonrpc":"2.0","id":4,"method":"programmer_read_block","params":{"block_id":4,"append_crc":true}}"#).unwrap();
        match req {
            Envelope::Request { id, method, params } => {
                assert_eq!(id, Id::Num(4));
                assert_eq!(method, "programmer_read_block");
                assert_eq!(params.get("append_crc"), Some(&json!(true)));
            }
            other => panic!("expected request, got {other:?}"),
        }

        let note = parse(r#"{"jsonrpc":"2.0","method":"progress"}"#).unwrap();
        assert_eq!(
            note,
            Envelope::Notification {
                method: "progress".into(),
                params: Params::None
            }
        );
    }

    #[test]
    fn classifies_success_with_falsy_result() {
        let env = parse(r#"{"jsonrpc":"2.0","id":"a","result":false}"#).unwrap();
        assert_eq!(
            env,
            Envelope::Success {
                id: Id::Str("a".into()),
                result: json!(false)
            }
        );
    }

    #[test]
    fn classifies_error_with_null_id() {
        let env =
            parse(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32600,"message":"Invalid Request"}}"#)
                .unwrap();
        match env {
            Envelope::Error { id, error } => {
                assert!(id.is_none());
                assert_eq!(error.code, -32600);
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn result_and_error_together_are_invalid() {
        let err = parse(
            r#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":1,"message":"x"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidRequest(_)));
    }

    #[test]
    fn success_without_id_is_invalid() {
        let err = parse(r#"{"jsonrpc":"2.0","result":"ef4016"}"#).unwrap_err();
        match err {
            EnvelopeError::InvalidRequest(errors) => {
                assert_eq!(errors.messages(), ["id is required"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn encoded_envelopes_parse_back() {
        let original = Envelope::Error {
            id: Some(Id::Num(12)),
            error: ErrorObject::method_not_found("erase_sector"),
        };
        assert_eq!(parse(&encode(&original)).unwrap(), original);
    }
}
