//! Structured extraction results and best-effort parsing of model output

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::concept_key;
use super::relationship::{CandidateRelation, validate_relations};
use crate::error::{Error, Result};

/// What the model says about one article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleAnalysis {
    pub title_ko: String,
    pub summary_ko: String,
    pub concept_names: Vec<String>,
}

impl ArticleAnalysis {
    /// Parse and clean a raw model response.
    ///
    /// Concept names are trimmed, blanks dropped, case-insensitive repeats
    /// removed (first spelling wins) and the list capped at `max_concepts`.
    pub fn from_response(response: &str, max_concepts: usize) -> Result<Self> {
        let value = parse_json_object(response)
            .ok_or_else(|| Error::ExtractionFailed("No JSON object in model output".to_string()))?;

        let title_ko = required_text(&value, "title_ko")?;
        let summary_ko = required_text(&value, "summary_ko")?;
        let names = value
            .get("concept_names")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::ExtractionFailed("'concept_names' must be a list".to_string()))?;

        let concept_names = clean_concept_names(
            names.iter().filter_map(Value::as_str),
            max_concepts,
        );

        if concept_names.is_empty() {
            return Err(Error::ExtractionFailed(
                "No valid concept names found".to_string(),
            ));
        }

        Ok(Self {
            title_ko,
            summary_ko,
            concept_names,
        })
    }
}

fn required_text(value: &Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| Error::ExtractionFailed(format!("Missing required field '{}'", key)))
}

/// Trim, drop blanks, dedupe case-insensitively and cap.
pub fn clean_concept_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
    max_concepts: usize,
) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(concept_key(name)))
        .take(max_concepts)
        .map(str::to_string)
        .collect()
}

/// Parse a relation-discovery response into validated candidates.
pub fn relations_from_response(response: &str) -> Result<Vec<CandidateRelation>> {
    let value = parse_json_object(response)
        .ok_or_else(|| Error::ExtractionFailed("No JSON object in model output".to_string()))?;

    let raw = value
        .get("relations")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::ExtractionFailed("'relations' must be a list".to_string()))?;

    let relations = validate_relations(raw);
    if relations.is_empty() {
        return Err(Error::ExtractionFailed("No valid relations found".to_string()));
    }
    Ok(relations)
}

/// Recover a JSON object from chatty model output.
///
/// Tries the whole text, then a fenced code block, then the span from the
/// first `{` to the last `}`.
pub fn parse_json_object(response: &str) -> Option<Value> {
    let trimmed = response.trim();

    let candidates = [Some(trimmed), fenced_block(trimmed), brace_span(trimmed)];
    candidates
        .into_iter()
        .flatten()
        .filter_map(|text| serde_json::from_str::<Value>(text).ok())
        .find(Value::is_object)
}

fn fenced_block(response: &str) -> Option<&str> {
    if let Some(start) = response.find("```json") {
        let body = &response[start + 7..];
        return body.find("```").map(|end| body[..end].trim());
    }

    let start = response.find("```")?;
    let after = &response[start + 3..];
    let body = &after[after.find('\n')? + 1..];
    body.find("```").map(|end| body[..end].trim())
}

fn brace_span(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (start < end).then(|| &response[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"title_ko": "제목", "summary_ko": "요약", "concept_names": ["GPU", "CUDA"]}"#;

    #[test]
    fn test_parse_direct_json() {
        let analysis = ArticleAnalysis::from_response(VALID, 5).unwrap();
        assert_eq!(analysis.title_ko, "제목");
        assert_eq!(analysis.concept_names, vec!["GPU", "CUDA"]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let response = format!("Here you go:\n```json\n{}\n```\nThanks", VALID);
        let analysis = ArticleAnalysis::from_response(&response, 5).unwrap();
        assert_eq!(analysis.concept_names.len(), 2);

        let plain_fence = format!("```\n{}\n```", VALID);
        assert!(ArticleAnalysis::from_response(&plain_fence, 5).is_ok());
    }

    #[test]
    fn test_parse_brace_span() {
        let response = format!("Sure! {} Let me know if you need more.", VALID);
        let analysis = ArticleAnalysis::from_response(&response, 5).unwrap();
        assert_eq!(analysis.summary_ko, "요약");
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = ArticleAnalysis::from_response("I cannot help with that.", 5).unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(_)));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let response = r#"{"title_ko": "제목", "concept_names": ["GPU"]}"#;
        assert!(ArticleAnalysis::from_response(response, 5).is_err());

        let response = r#"{"title_ko": "제목", "summary_ko": "요약", "concept_names": "GPU"}"#;
        assert!(ArticleAnalysis::from_response(response, 5).is_err());
    }

    #[test]
    fn test_concept_names_cleaned_and_capped() {
        let response = r#"{
            "title_ko": "t", "summary_ko": "s",
            "concept_names": [" GPU ", "", "gpu", 7, "CUDA", "TPU", "NPU", "HBM", "NVLink"]
        }"#;
        let analysis = ArticleAnalysis::from_response(response, 5).unwrap();
        assert_eq!(analysis.concept_names, vec!["GPU", "CUDA", "TPU", "NPU", "HBM"]);
    }

    #[test]
    fn test_empty_concept_list_fails() {
        let response = r#"{"title_ko": "t", "summary_ko": "s", "concept_names": ["  "]}"#;
        assert!(ArticleAnalysis::from_response(response, 5).is_err());
    }

    #[test]
    fn test_relations_from_response() {
        let response = r#"```json
        {"relations": [
            {"from": "CUDA", "to": "GPU", "relation_type": "USED_IN"},
            {"from": "CUDA", "to": "GPU", "relation_type": "USED_IN"},
            {"from": "GPU", "to": "GPU", "relation_type": "RELATED_TO"}
        ]}
        ```"#;
        let relations = relations_from_response(response).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].from, "CUDA");
    }

    #[test]
    fn test_relations_all_invalid_fails() {
        let response = r#"{"relations": [{"from": "A", "to": "B", "relation_type": "HATES"}]}"#;
        assert!(relations_from_response(response).is_err());
        assert!(relations_from_response(r#"{"edges": []}"#).is_err());
    }
}
