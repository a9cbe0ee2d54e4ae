use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard JSON-RPC error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Text was not valid JSON (-32700).
    ParseError,
    /// Well-formed JSON that is not a conforming envelope (-32600).
    InvalidRequest,
    /// The device does not implement the method (-32601).
    MethodNotFound,
    /// The method exists but the params are wrong (-32602).
    InvalidParams,
    /// Generic device-side failure (-32603).
    InternalError,
    /// Any other, implementation-defined code.
    Server(i64),
}

impl ErrorCode {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Numeric wire value.
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => Self::PARSE_ERROR,
            ErrorCode::InvalidRequest => Self::INVALID_REQUEST,
            ErrorCode::MethodNotFound => Self::METHOD_NOT_FOUND,
            ErrorCode::InvalidParams => Self::INVALID_PARAMS,
            ErrorCode::InternalError => Self::INTERNAL_ERROR,
            ErrorCode::Server(code) => code,
        }
    }

    /// Classify a numeric wire value.
    pub fn from_code(code: i64) -> Self {
        match code {
            Self::PARSE_ERROR => ErrorCode::ParseError,
            Self::INVALID_REQUEST => ErrorCode::InvalidRequest,
            Self::METHOD_NOT_FOUND => ErrorCode::MethodNotFound,
            Self::INVALID_PARAMS => ErrorCode::InvalidParams,
            Self::INTERNAL_ERROR => ErrorCode::InternalError,
            other => ErrorCode::Server(other),
        }
    }

    /// Canonical message for the standard codes.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::Server(_) => "Server error",
        }
    }
}

/// The `error` member of an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Taxonomy of this error's code.
    pub fn kind(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, "Method not found").with_data(Value::from(method))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, "Invalid params").with_data(Value::from(detail.into()))
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, "Internal error").with_data(Value::from(detail.into()))
    }
}

impl std::fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)?;
        if let Some(data) = &self.data {
            write!(f, ": {data}")?;
        }
        Ok(())
    }
}

/// Human-readable validation failures collected while building or parsing
/// an envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .0.join("; "))]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn into_messages(self) -> Vec<String> {
        self.0
    }
}

/// Errors that can occur while decoding an inbound envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The text is not valid JSON.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The JSON is well formed but not a conforming envelope.
    #[error("invalid envelope: {0}")]
    InvalidRequest(ValidationErrors),
}

impl EnvelopeError {
    /// Wire code for reporting this failure back to the sender.
    pub fn code(&self) -> ErrorCode {
        match self {
            EnvelopeError::Parse(_) => ErrorCode::ParseError,
            EnvelopeError::InvalidRequest(_) => ErrorCode::InvalidRequest,
        }
    }

    /// Error object suitable for an id-less error reply.
    pub fn to_error_object(&self) -> ErrorObject {
        let code = self.code();
        let detail = match self {
            EnvelopeError::Parse(err) => err.to_string(),
            EnvelopeError::InvalidRequest(errors) => errors.to_string(),
        };
        ErrorObject::new(code, code.default_message()).with_data(Value::from(detail))
    }
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_codes_roundtrip_through_numeric_value() {
        for code in [
            ErrorCode::ParseError,
            ErrorCode::InvalidRequest,
            ErrorCode::MethodNotFound,
            ErrorCode::InvalidParams,
            ErrorCode::InternalError,
        ] {
            assert_eq!(ErrorCode::from_code(code.code()), code);
        }
        assert_eq!(ErrorCode::from_code(-32000), ErrorCode::Server(-32000));
    }

    #[test]
    fn error_object_skips_absent_data() {
        let obj = ErrorObject::new(ErrorCode::InternalError, "boom");
        let json = serde_json::to_string(&obj).unwrap();
        assert_eq!(json, r#"{"code":-32603,"message":"boom"}"#);
    }

    #[test]
    fn validation_errors_join_for_display() {
        let errors = ValidationErrors(vec!["a".into(), "b".into()]);
        assert_eq!(errors.to_string(), "a; b");
    }

    #[test]
    fn parse_failure_maps_to_parse_error_object() {
        let err: EnvelopeError = serde_json::from_str::<Value>("{").unwrap_err().into();
        let obj = err.to_error_object();
        assert_eq!(obj.code, -32700);
        assert_eq!(obj.message, "Parse error");
    }
}
