//! Request layer: validates transform requests and maps engine outcomes to responses.
//!
//! Requests carry `content`, `type` (a profile name or grammar reference) and `direction`. The
//! response is an HTTP-style status with a JSON body holding either `output` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::errors::{EngineError, ErrorCategory, GrammarError, TransformError};
use crate::transform::Transcoder;

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_UNPROCESSABLE: u16 = 422;
pub const STATUS_INTERNAL: u16 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRequest {
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub direction: Option<String>,
}

impl TransformRequest {
    pub fn new(
        content: impl Into<String>,
        kind: impl Into<String>,
        direction: impl Into<String>,
    ) -> Self {
        Self {
            content: Some(content.into()),
            kind: Some(kind.into()),
            direction: Some(direction.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformResponse {
    pub status: u16,
    pub body: Value,
}

impl TransformResponse {
    fn ok(output: String) -> Self {
        Self {
            status: STATUS_OK,
            body: json!({ "output": output }),
        }
    }

    fn error(status: u16, error: Value) -> Self {
        Self {
            status,
            body: json!({ "error": error }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn output(&self) -> Option<&str> {
        self.body.get("output").and_then(Value::as_str)
    }
}

/// Handles one request. Never fails: every engine error becomes an error response.
pub fn handle(transcoder: &Transcoder, request: &TransformRequest) -> TransformResponse {
    let (content, kind, direction) = match (&request.content, &request.kind, &request.direction) {
        (Some(content), Some(kind), Some(direction)) => (content, kind, direction),
        _ => {
            let missing = [
                ("content", request.content.is_none()),
                ("type", request.kind.is_none()),
                ("direction", request.direction.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect::<Vec<_>>();
            debug!(?missing, "rejected transform request");
            return TransformResponse::error(
                STATUS_BAD_REQUEST,
                json!({
                    "category": "request",
                    "message": format!("missing parameter: {}", missing.join(", ")),
                }),
            );
        }
    };

    let reference = transcoder.resolve_profile(kind);
    match transcoder.transform(reference, content, direction) {
        Ok(output) => {
            info!(reference, direction = %direction, bytes = output.len(), "transform ok");
            TransformResponse::ok(output)
        }
        Err(EngineError::Transform(error)) => transform_error_response(&error),
        Err(EngineError::Grammar(error)) => grammar_error_response(&error),
    }
}

fn transform_error_response(error: &TransformError) -> TransformResponse {
    let category = error.category();
    let status = match category {
        ErrorCategory::Request => STATUS_BAD_REQUEST,
        ErrorCategory::Input | ErrorCategory::Limit => STATUS_UNPROCESSABLE,
        ErrorCategory::Grammar => STATUS_INTERNAL,
    };
    TransformResponse::error(
        status,
        json!({
            "category": category,
            "code": error.kind.code_suffix(),
            "message": error.kind.to_string(),
            "line": error.location.line,
            "column": error.location.column,
            "snippet": error.snippet,
        }),
    )
}

fn grammar_error_response(error: &GrammarError) -> TransformResponse {
    TransformResponse::error(
        STATUS_INTERNAL,
        json!({
            "category": "grammar",
            "code": error.kind.code_suffix(),
            "message": error.kind.to_string(),
            "grammar": error.source_name(),
            "line": error.location.line,
            "column": error.location.column,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::MemorySource;
    use std::collections::BTreeMap;

    fn transcoder() -> Transcoder {
        let source = MemorySource::new()
            .with("upper", r#"%bidirectional; %entry r; r : x=[a-z]+ <=> "<" x=[a-z]+ ">" ;"#)
            .with("broken", "r = nowhere ;");
        let profiles = BTreeMap::from([("u".to_string(), "upper".to_string())]);
        Transcoder::new(source).with_profiles(profiles)
    }

    #[test]
    fn profile_resolves_to_grammar() {
        let response = handle(&transcoder(), &TransformRequest::new("abc", "u", "a2b"));
        assert!(response.is_success());
        assert_eq!(response.output(), Some("<abc>"));
    }

    #[test]
    fn missing_parameters_are_listed() {
        let request = TransformRequest {
            content: Some("x".into()),
            ..Default::default()
        };
        let response = handle(&transcoder(), &request);
        assert_eq!(response.status, STATUS_BAD_REQUEST);
        assert_eq!(
            response.body["error"]["message"],
            "missing parameter: type, direction"
        );
    }

    #[test]
    fn input_errors_carry_position() {
        let response = handle(&transcoder(), &TransformRequest::new("ab1", "upper", "a2b"));
        assert_eq!(response.status, STATUS_UNPROCESSABLE);
        let error = &response.body["error"];
        assert_eq!(error["category"], "input");
        assert_eq!(error["column"], 3);
        assert_eq!(error["snippet"], "1");
    }

    #[test]
    fn grammar_errors_are_internal() {
        let response = handle(&transcoder(), &TransformRequest::new("x", "broken", "a2b"));
        assert_eq!(response.status, STATUS_INTERNAL);
        assert_eq!(response.body["error"]["code"], "unknown_rule");
    }
}
