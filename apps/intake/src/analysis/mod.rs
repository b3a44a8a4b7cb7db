//! Field Extractor: asks the AI analysis provider for the four candidate fields
//! and validates whatever comes back.
//!
//! The provider is untrusted: any JSON object is accepted, missing or mistyped
//! fields fall back to defaults (`""` / `0`), and only a non-object response is
//! an error.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::analysis::prompts::{candidate_schema, RESUME_ANALYSIS_PROMPT};
use crate::llm_client::{AnalysisProvider, LlmError};

pub mod prompts;

/// Resume text beyond this many characters is not sent to the provider.
pub const MAX_RESUME_CHARS: usize = 30_000;

pub const MIN_FIT_SCORE: f64 = 0.0;
pub const MAX_FIT_SCORE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateFields {
    pub name: String,
    pub email: String,
    pub college: String,
    /// Always within `[MIN_FIT_SCORE, MAX_FIT_SCORE]`.
    pub fit_score: f64,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis provider failed: {0}")]
    Provider(#[from] LlmError),

    #[error("malformed analysis response: {0}")]
    Malformed(String),
}

/// Typed view of the provider response with the defaulting rules attached.
#[derive(Debug, Deserialize)]
struct RawCandidate {
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    college: String,
    #[serde(
        default,
        rename = "fitScore",
        alias = "fit_score",
        deserialize_with = "lenient_score"
    )]
    fit_score: f64,
}

#[derive(Clone)]
pub struct FieldExtractor {
    provider: Arc<dyn AnalysisProvider>,
    schema: Value,
}

impl FieldExtractor {
    pub fn new(provider: Arc<dyn AnalysisProvider>) -> Self {
        Self {
            provider,
            schema: candidate_schema(),
        }
    }

    pub async fn extract_fields(&self, text: &str) -> Result<CandidateFields, AnalysisError> {
        let prompt = build_prompt(text);
        let response = self.provider.analyze(&prompt, &self.schema).await?;
        let fields = normalize_response(response)?;
        debug!(
            "Analysis produced name={:?} email={:?} fit_score={}",
            fields.name, fields.email, fields.fit_score
        );
        Ok(fields)
    }
}

pub fn build_prompt(text: &str) -> String {
    let truncated: String = text.chars().take(MAX_RESUME_CHARS).collect();
    RESUME_ANALYSIS_PROMPT.replace("{resume_text}", &truncated)
}

/// Applies the defaulting rules to a provider response.
pub fn normalize_response(response: Value) -> Result<CandidateFields, AnalysisError> {
    if !response.is_object() {
        return Err(AnalysisError::Malformed(format!(
            "expected a JSON object, got {}",
            json_kind(&response)
        )));
    }
    let raw: RawCandidate = serde_json::from_value(response)
        .map_err(|e| AnalysisError::Malformed(e.to_string()))?;
    Ok(CandidateFields {
        name: raw.name,
        email: raw.email,
        college: raw.college,
        fit_score: raw.fit_score,
    })
}

/// Out-of-range, non-finite and missing scores all become `MIN_FIT_SCORE`.
pub fn clamp_fit_score(score: Option<f64>) -> f64 {
    match score {
        Some(s) if s.is_finite() && (MIN_FIT_SCORE..=MAX_FIT_SCORE).contains(&s) => s,
        _ => MIN_FIT_SCORE,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().to_string(),
        _ => String::new(),
    })
}

fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let score = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(clamp_fit_score(score))
}

fn json_kind(value: &Value) -> &'static str {
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
    use super::*;
    use crate::analysis::prompts::{FIELD_COLLEGE, FIELD_EMAIL, FIELD_FIT_SCORE, FIELD_NAME};
    use crate::testing::FakeAnalysisProvider;
    use serde_json::json;

    #[test]
    fn test_complete_response_passes_through() {
        let fields = normalize_response(json!({
            "name": "John Smith",
            "email": "john@x.com",
            "college": "MIT",
            "fitScore": 82
        }))
        .unwrap();
        assert_eq!(
            fields,
            CandidateFields {
                name: "John Smith".to_string(),
                email: "john@x.com".to_string(),
                college: "MIT".to_string(),
                fit_score: 82.0,
            }
        );
    }

    #[test]
    fn test_missing_keys_default_to_empty_and_zero() {
        let fields = normalize_response(json!({"name": "Jane Doe"})).unwrap();
        assert_eq!(fields.name, "Jane Doe");
        assert_eq!(fields.email, "");
        assert_eq!(fields.college, "");
        assert_eq!(fields.fit_score, 0.0);
    }

    #[test]
    fn test_out_of_range_score_defaults_to_zero() {
        for score in [json!(150), json!(-3), json!(100.5)] {
            let fields = normalize_response(json!({ "fitScore": score })).unwrap();
            assert_eq!(fields.fit_score, 0.0, "score {score}");
        }
    }

    #[test]
    fn test_non_numeric_score_defaults_to_zero() {
        for score in [json!("abc"), json!(null), json!(true), json!([82])] {
            let fields = normalize_response(json!({ "fitScore": score })).unwrap();
            assert_eq!(fields.fit_score, 0.0, "score {score}");
        }
    }

    #[test]
    fn test_numeric_string_score_is_accepted() {
        let fields = normalize_response(json!({"fitScore": " 67.5 "})).unwrap();
        assert_eq!(fields.fit_score, 67.5);
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        assert_eq!(clamp_fit_score(Some(0.0)), 0.0);
        assert_eq!(clamp_fit_score(Some(100.0)), 100.0);
        assert_eq!(clamp_fit_score(Some(f64::NAN)), 0.0);
        assert_eq!(clamp_fit_score(Some(f64::INFINITY)), 0.0);
        assert_eq!(clamp_fit_score(None), 0.0);
    }

    #[test]
    fn test_null_and_non_string_fields_become_empty() {
        let fields =
            normalize_response(json!({"name": null, "email": 42, "college": "  Caltech "}))
                .unwrap();
        assert_eq!(fields.name, "");
        assert_eq!(fields.email, "");
        assert_eq!(fields.college, "Caltech");
    }

    #[test]
    fn test_snake_case_score_alias() {
        let fields = normalize_response(json!({"fit_score": 55})).unwrap();
        assert_eq!(fields.fit_score, 55.0);
    }

    #[test]
    fn test_non_object_response_is_malformed() {
        for response in [json!([1, 2]), json!("John"), json!(null), json!(7)] {
            let err = normalize_response(response.clone()).unwrap_err();
            assert!(
                matches!(err, AnalysisError::Malformed(_)),
                "{response}: {err}"
            );
        }
    }

    #[test]
    fn test_prompt_embeds_and_truncates_text() {
        let prompt = build_prompt("Python, Go");
        assert!(prompt.contains("RESUME TEXT:\nPython, Go"));

        let long = "é".repeat(MAX_RESUME_CHARS + 50);
        let prompt = build_prompt(&long);
        assert_eq!(prompt.matches('é').count(), MAX_RESUME_CHARS);
    }

    #[test]
    fn test_schema_requires_exactly_the_four_fields() {
        let schema = candidate_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(
            required,
            vec![FIELD_NAME, FIELD_EMAIL, FIELD_COLLEGE, FIELD_FIT_SCORE]
        );
        assert_eq!(schema["properties"].as_object().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_extract_fields_sends_schema_and_normalizes() {
        let provider = Arc::new(FakeAnalysisProvider::responding(
            json!({"name": "Ann Lee", "fitScore": 150}),
        ));
        let extractor = FieldExtractor::new(provider.clone());
        let fields = extractor.extract_fields("Ann Lee\nRust").await.unwrap();
        assert_eq!(fields.name, "Ann Lee");
        assert_eq!(fields.fit_score, 0.0);
        assert_eq!(provider.calls(), 1);
        assert_eq!(provider.last_schema(), Some(candidate_schema()));
    }

    #[tokio::test]
    async fn test_provider_error_is_analysis_failure() {
        let provider = Arc::new(FakeAnalysisProvider::failing());
        let extractor = FieldExtractor::new(provider);
        let err = extractor.extract_fields("text").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Provider(_)));
    }
}
