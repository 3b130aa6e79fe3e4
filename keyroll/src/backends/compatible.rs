//! OpenAI-compatible `/chat/completions` wire format, shared by HuggingFace,
//! OpenRouter, Groq, ArliAI and ShaleProtocol.

use super::BackendError;
use crate::transport::HttpRequest;
use serde::{Deserialize, Serialize};

/// How the credential is sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// The raw key in a named header, e.g. `x-goog-api-key: <key>`.
    Header { name: String },
}

impl AuthStyle {
    pub fn apply(&self, req: HttpRequest, key: &str) -> HttpRequest {
        match self {
            AuthStyle::Bearer => req.header("Authorization", format!("Bearer {}", key)),
            AuthStyle::Header { name } => req.header(name.as_str(), key),
        }
    }
}

// ---- Request/response types (OpenAI wire format) ----

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMsg>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMsg {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResp>,
}

#[derive(Deserialize)]
struct ChatMessageResp {
    content: Option<String>,
}

/// Single user turn carrying the prompt verbatim.
pub fn encode(model: &str, prompt: &str) -> serde_json::Value {
    let body = ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMsg {
            role: "user".into(),
            content: prompt.to_string(),
        }],
    };
    serde_json::to_value(body).unwrap_or(serde_json::Value::Null)
}

/// Extract `choices[0].message.content`.
pub fn decode(body: &str) -> Result<String, BackendError> {
    let resp: ChatResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::decode(format!("invalid chat completion JSON: {}", e), body))?;

    resp.choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| BackendError::decode("response has no choices[0].message.content", body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bearer_auth_header() {
        let req = AuthStyle::Bearer.apply(HttpRequest::new("u", json!({})), "k1");
        assert_eq!(req.header_value("Authorization"), Some("Bearer k1"));
    }

    #[test]
    fn named_header_auth() {
        let style = AuthStyle::Header {
            name: "x-goog-api-key".into(),
        };
        let req = style.apply(HttpRequest::new("u", json!({})), "k1");
        assert_eq!(req.header_value("x-goog-api-key"), Some("k1"));
        assert_eq!(req.header_value("Authorization"), None);
    }

    #[test]
    fn request_carries_model_and_prompt() {
        let body = encode("llama-3.3-70b-versatile", "Please answer in English.\nhello?");
        let parsed: ChatRequest = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.model, "llama-3.3-70b-versatile");
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.messages[0].role, "user");
        assert_eq!(parsed.messages[0].content, "Please answer in English.\nhello?");
    }

    #[test]
    fn decodes_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Groq response text"}},{"message":{"content":"second"}}]}"#;
        assert_eq!(decode(body).unwrap(), "Groq response text");
    }

    #[test]
    fn null_content_is_decode_failure() {
        let err = decode(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn empty_choices_is_decode_failure() {
        assert!(decode(r#"{"choices":[]}"#).unwrap_err().is_decode());
        assert!(decode(r#"{}"#).unwrap_err().is_decode());
    }

    #[test]
    fn malformed_json_is_decode_failure() {
        let err = decode("<html>bad gateway</html>").unwrap_err();
        assert!(err.is_decode());
        assert_eq!(err.body(), Some("<html>bad gateway</html>"));
    }
}
