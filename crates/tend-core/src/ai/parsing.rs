//! JSON parsing helpers for reasoning backend responses
//!
//! Models often wrap the JSON payload in prose or code fences. We take the
//! span between the first `{` and the last `}`.

use crate::error::{Error, Result};

use super::types::{SuggestedInsight, SuggestionSet};

const RAW_PREVIEW_CHARS: usize = 200;

/// Locate the JSON object inside a model response
pub fn extract_json(response: &str) -> Result<&str> {
    let response = response.trim();
    match (response.find('{'), response.rfind('}')) {
        (Some(s), Some(e)) if s < e => Ok(&response[s..=e]),
        _ => Err(Error::InvalidData(format!(
            "No JSON found in backend response | Raw: {}",
            preview(response)
        ))),
    }
}

/// Parse the `{"insights": [...]}` envelope
pub fn parse_suggestions(response: &str) -> Result<Vec<SuggestedInsight>> {
    let json = extract_json(response)?;
    let set: SuggestionSet = serde_json::from_str(json).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid suggestion JSON from backend: {} | Raw: {}",
            e,
            preview(json)
        ))
    })?;
    Ok(set.insights)
}

fn preview(text: &str) -> String {
    if text.chars().count() > RAW_PREVIEW_CHARS {
        format!("{}...", text.chars().take(RAW_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_response() {
        let response = r#"Sure! Here you go:
```json
{"insights": [{"category": "coping", "title": "Breathe", "message": "Try box breathing.", "confidence": 0.7}]}
```"#;
        let suggestions = parse_suggestions(response).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].category, "coping");
        assert_eq!(suggestions[0].confidence, Some(0.7));
        assert!(suggestions[0].advice.is_empty());
    }

    #[test]
    fn test_missing_insights_key_is_empty() {
        assert!(parse_suggestions("{}").unwrap().is_empty());
    }

    #[test]
    fn test_no_json() {
        let err = parse_suggestions("I cannot help with that").unwrap_err();
        assert!(err.to_string().contains("No JSON"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(parse_suggestions(r#"{"insights": [{"category": }]}"#).is_err());
    }
}
