//! Google Generative AI `generateContent` wire format.
//!
//! The model travels in the URL, so the request body only holds the prompt.

use super::BackendError;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Part {
    pub text: String,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

pub fn encode(prompt: &str) -> serde_json::Value {
    let body = GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
    };
    serde_json::to_value(body).unwrap_or(serde_json::Value::Null)
}

/// Extract `candidates[0].content.parts[0].text`.
pub fn decode(body: &str) -> Result<String, BackendError> {
    let resp: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::decode(format!("invalid Gemini JSON: {}", e), body))?;

    resp.candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .and_then(|p| p.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| BackendError::decode("response has no candidates[0].content.parts[0].text", body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wraps_prompt_in_single_part() {
        let body = encode("hello?");
        let parsed: GenerateContentRequest = serde_json::from_value(body).unwrap();
        assert_eq!(
            parsed,
            GenerateContentRequest {
                contents: vec![Content {
                    parts: vec![Part { text: "hello?".into() }],
                }],
            }
        );
    }

    #[test]
    fn decodes_first_part_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Gemini response text"},{"text":"ignored"}],"role":"model"},"finishReason":"STOP"}]}"#;
        assert_eq!(decode(body).unwrap(), "Gemini response text");
    }

    #[test]
    fn blocked_prompt_without_candidates_fails() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = decode(body).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn part_without_text_fails() {
        let body = r#"{"candidates":[{"content":{"parts":[{"inlineData":{}}]}}]}"#;
        assert!(decode(body).unwrap_err().is_decode());
    }
}
