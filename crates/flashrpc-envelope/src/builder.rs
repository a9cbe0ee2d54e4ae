use serde_json::Value;

use crate::envelope::{Envelope, Id, Params};
use crate::error::{ErrorObject, ValidationErrors};
use crate::hook;

type Built = std::result::Result<Envelope, ValidationErrors>;

/// Build a request envelope.
///
/// `id` must be a string or an integer (a float with no fractional part is
/// accepted); a scalar `params` is wrapped in a one-element array.
pub fn request(id: Value, method: Value, params: Option<Value>) -> Built {
    let mut errors = Vec::new();
    let id = check_id(Some(&id), &mut errors);
    let method = check_method(Some(&method), &mut errors);
    let params = wrap_params(params.as_ref());
    finish(errors, || Envelope::Request {
        id: id.unwrap_or(Id::Num(0)),
        method: method.unwrap_or_default(),
        params,
    })
}

/// Build a notification envelope (no id, no reply expected).
pub fn notification(method: Value, params: Option<Value>) -> Built {
    let mut errors = Vec::new();
    let method = check_method(Some(&method), &mut errors);
    let params = wrap_params(params.as_ref());
    finish(errors, || Envelope::Notification {
        method: method.unwrap_or_default(),
        params,
    })
}

/// Build a success envelope.
///
/// `result` may be any JSON value including `null` or `false`; `None` means
/// the result is undefined and is rejected.
pub fn success(id: Value, result: Option<Value>) -> Built {
    let mut errors = Vec::new();
    let id = check_id(Some(&id), &mut errors);
    if result.is_none() {
        errors.push("result is required".to_string());
    }
    finish(errors, || Envelope::Success {
        id: id.unwrap_or(Id::Num(0)),
        result: result.unwrap_or(Value::Null),
    })
}

/// Build an error envelope. A `None` or `null` id is allowed for errors that
/// cannot be tied to a request.
pub fn error(id: Option<Value>, error: Value) -> Built {
    let mut errors = Vec::new();
    let id = match id {
        None | Some(Value::Null) => None,
        Some(value) => check_id(Some(&value), &mut errors),
    };
    let error = check_error_object(Some(&error), &mut errors);
    finish(errors, || Envelope::Error {
        id,
        error: error.unwrap_or_else(|| ErrorObject {
            code: 0,
            message: String::new(),
            data: None,
        }),
    })
}

fn finish(errors: Vec<String>, build: impl FnOnce() -> Envelope) -> Built {
    if errors.is_empty() {
        return Ok(build());
    }
    let errors = ValidationErrors(errors);
    hook::report(&errors);
    Err(errors)
}

pub(crate) fn check_id(value: Option<&Value>, errors: &mut Vec<String>) -> Option<Id> {
    match value {
        None | Some(Value::Null) => {
            errors.push("id is required".to_string());
            None
        }
        Some(Value::String(s)) => Some(Id::Str(s.clone())),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Some(Id::Num(i));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Some(Id::Num(f as i64))
                }
                _ => {
                    errors.push(format!("id must be an integer, got {n}"));
                    None
                }
            }
        }
        Some(other) => {
            errors.push(format!(
                "id must be a string or an integer, got {}",
                type_name(other)
            ));
            None
        }
    }
}

pub(crate) fn check_method(value: Option<&Value>, errors: &mut Vec<String>) -> Option<String> {
    match value {
        None | Some(Value::Null) => {
            errors.push("method is required".to_string());
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            errors.push(format!("method must be a string, got {}", type_name(other)));
            None
        }
    }
}

pub(crate) fn wrap_params(value: Option<&Value>) -> Params {
    match value {
        None | Some(Value::Null) => Params::None,
        Some(Value::Array(items)) => Params::Array(items.clone()),
        Some(Value::Object(map)) => Params::Object(map.clone()),
        Some(scalar) => Params::Array(vec![scalar.clone()]),
    }
}

pub(crate) fn check_error_object(
    value: Option<&Value>,
    errors: &mut Vec<String>,
) -> Option<ErrorObject> {
    let obj = match value {
        Some(Value::Object(obj)) => obj,
        None => {
            errors.push("error is required".to_string());
            return None;
        }
        Some(other) => {
            errors.push(format!("error must be an object, got {}", type_name(other)));
            return None;
        }
    };

    let code = match obj.get("code") {
        Some(Value::Number(n)) if n.as_i64().is_some() => n.as_i64(),
        Some(other) => {
            errors.push(format!(
                "error.code must be an integer, got {}",
                type_name(other)
            ));
            None
        }
        None => {
            errors.push("error.code is required".to_string());
            None
        }
    };
    let message = match obj.get("message") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            errors.push(format!(
                "error.message must be a string, got {}",
                type_name(other)
            ));
            None
        }
        None => {
            errors.push("error.message is required".to_string());
            None
        }
    };

    Some(ErrorObject {
        code: code?,
        message: message?,
        data: obj.get("data").cloned(),
    })
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::hook::set_validation_hook;

    #[test]
    fn request_wraps_scalar_params() {
        let env = request(json!(1), json!("programmer_read_block"), Some(json!(5))).unwrap();
        assert_eq!(
            env,
            Envelope::Request {
                id: Id::Num(1),
                method: "programmer_read_block".into(),
                params: Params::Array(vec![json!(5)]),
            }
        );
    }

    #[test]
    fn request_accepts_integral_float_id() {
        let env = request(json!(3.0), json!("get_jedec_id"), None).unwrap();
        assert_eq!(env.id(), Some(&Id::Num(3)));
    }

    #[test]
    fn request_rejects_float_id_past_i64_range() {
        let two_pow_63 = 9_223_372_036_854_775_808.0_f64;
        let errors = request(json!(two_pow_63), json!("get_jedec_id"), None).unwrap_err();
        assert!(errors.messages()[0].contains("id must be an integer"));

        let env = request(json!(-two_pow_63), json!("get_jedec_id"), None).unwrap();
        assert_eq!(env.id(), Some(&Id::Num(i64::MIN)));
    }

    #[test]
    fn request_collects_every_problem() {
        let errors = request(json!(1.5), json!(42), None).unwrap_err();
        assert_eq!(errors.messages().len(), 2);
        assert!(errors.messages()[0].contains("id must be an integer"));
        assert!(errors.messages()[1].contains("method must be a string"));
    }

    #[test]
    fn notification_requires_method() {
        let errors = notification(Value::Null, None).unwrap_err();
        assert_eq!(errors.messages(), ["method is required"]);
    }

    #[test]
    fn success_accepts_falsy_results_but_not_undefined() {
        for falsy in [json!(null), json!(false), json!(0), json!("")] {
            assert!(success(json!(9), Some(falsy)).is_ok());
        }
        let errors = success(json!(9), None).unwrap_err();
        assert_eq!(errors.messages(), ["result is required"]);
    }

    #[test]
    fn error_requires_integer_code_and_string_message() {
        let errors = error(None, json!({"code": "x"})).unwrap_err();
        assert_eq!(
            errors.messages(),
            [
                "error.code must be an integer, got string",
                "error.message is required"
            ]
        );

        let env = error(
            Some(json!(2)),
            json!({"code": -32601, "message": "Method not found", "data": "nope"}),
        )
        .unwrap();
        match env {
            Envelope::Error { id, error } => {
                assert_eq!(id, Some(Id::Num(2)));
                assert_eq!(error.code, -32601);
                assert_eq!(error.data, Some(json!("nope")));
            }
            other => panic!("expected error envelope, got {other:?}"),
        }
    }

    #[test]
    fn failures_reach_the_validation_hook() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        set_validation_hook(Arc::new(move |errors: &ValidationErrors| {
            sink.lock().unwrap().extend(errors.messages().iter().cloned());
        }));

        let _ = request(json!({"not": "an id"}), json!("hook_marker_method"), None);

        let seen = seen.lock().unwrap();
        assert!(seen
            .iter()
            .any(|m| m == "id must be a string or an integer, got object"));
    }
}
