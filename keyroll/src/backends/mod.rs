pub mod compatible;
pub mod gemini;
pub mod http;
pub mod retry;
pub mod sanitize;

use crate::store::CredentialStore;
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::Arc;

pub use compatible::AuthStyle;
pub use http::HttpBackend;
pub use retry::{RetryOn, RetryPolicy};

/// Why a single backend call failed.
///
/// The body, when present, has already been passed through
/// [`sanitize::sanitize_body`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// No response, or a non-success status.
    #[error("transport failure{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        body: Option<String>,
        message: String,
    },

    /// A success status whose body did not have the expected shape.
    #[error("decode failure: {message}")]
    Decode {
        body: Option<String>,
        message: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl BackendError {
    /// The exchange did not complete (connect, TLS, timeout, body read).
    pub fn network(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            body: None,
            message: message.into(),
        }
    }

    /// The remote answered with a non-success status.
    pub fn http(status: u16, body: &str) -> Self {
        Self::http_redacting(status, body, "")
    }

    /// As [`Self::http`], also removing `credential` from the stored body.
    pub fn http_redacting(status: u16, body: &str, credential: &str) -> Self {
        let body = sanitize::sanitize_body(body, credential);
        Self::Transport {
            status: Some(status),
            message: format!("remote returned {}", status),
            body: if body.is_empty() { None } else { Some(body) },
        }
    }

    pub fn decode(message: impl Into<String>, body: &str) -> Self {
        Self::decode_redacting(message, body, "")
    }

    /// As [`Self::decode`], also removing `credential` from the stored body.
    pub fn decode_redacting(message: impl Into<String>, body: &str, credential: &str) -> Self {
        let body = sanitize::sanitize_body(body, credential);
        Self::Decode {
            message: message.into(),
            body: if body.is_empty() { None } else { Some(body) },
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message, .. } | Self::Decode { message, .. } => message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            Self::Decode { .. } => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Transport { body, .. } | Self::Decode { body, .. } => body.as_deref(),
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// One concrete AI provider.
///
/// The credential is call-scoped: the dispatcher assigns it right before each
/// attempt. Implementations never add text to the prompt.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable identifier, used to look up credentials and the default model.
    fn name(&self) -> &str;

    /// Use `credential` for the next call. Not validated.
    fn set_credential(&mut self, credential: &str);

    /// Run one completion, including the backend's own bounded retries.
    async fn complete(&self, prompt: &str, model: Option<&str>) -> Result<String, BackendError>;
}

/// Pick the model for a call: explicit override, then the configured default,
/// then the backend's hardcoded fallback.
pub fn select_model(override_model: Option<&str>, configured: Option<String>, fallback: &str) -> String {
    override_model
        .map(str::to_string)
        .or(configured)
        .unwrap_or_else(|| fallback.to_string())
}

/// Request/response shape spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Google `generateContent`.
    Gemini,
    /// OpenAI-style `/chat/completions`.
    ChatCompletions,
}

/// Static description of a provider endpoint.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub name: &'static str,
    /// Endpoint URL; `{model}` is substituted with the selected model.
    pub url: &'static str,
    pub auth: AuthStyle,
    pub wire: WireFormat,
    pub fallback_model: &'static str,
}

impl ProviderSpec {
    pub fn endpoint(&self, model: &str) -> String {
        self.url.replace("{model}", model)
    }
}

/// The providers this crate knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Gemini,
    HuggingFace,
    OpenRouter,
    Groq,
    ArliAi,
    ShaleProtocol,
}

impl BackendKind {
    /// Registered by default, in rotation order.
    pub const DEFAULT: [BackendKind; 4] = [
        BackendKind::Gemini,
        BackendKind::HuggingFace,
        BackendKind::OpenRouter,
        BackendKind::Groq,
    ];

    pub const ALL: [BackendKind; 6] = [
        BackendKind::Gemini,
        BackendKind::HuggingFace,
        BackendKind::OpenRouter,
        BackendKind::Groq,
        BackendKind::ArliAi,
        BackendKind::ShaleProtocol,
    ];

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    pub fn spec(self) -> ProviderSpec {
        match self {
            BackendKind::Gemini => ProviderSpec {
                name: "Gemini",
                url: "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent",
                auth: AuthStyle::Header {
                    name: "x-goog-api-key".into(),
                },
                wire: WireFormat::Gemini,
                fallback_model: "gemini-2.5-pro",
            },
            BackendKind::HuggingFace => ProviderSpec {
                name: "HuggingFace",
                url: "https://router.huggingface.co/nebius/v1/chat/completions",
                auth: AuthStyle::Bearer,
                wire: WireFormat::ChatCompletions,
                fallback_model: "deepseek-ai/DeepSeek-R1-0528",
            },
            BackendKind::OpenRouter => ProviderSpec {
                name: "OpenRouter",
                url: "https://openrouter.ai/api/v1/chat/completions",
                auth: AuthStyle::Bearer,
                wire: WireFormat::ChatCompletions,
                fallback_model: "openrouter-model",
            },
            BackendKind::Groq => ProviderSpec {
                name: "Groq",
                url: "https://api.groq.com/openai/v1/chat/completions",
                auth: AuthStyle::Bearer,
                wire: WireFormat::ChatCompletions,
                fallback_model: "llama2-70b-4096",
            },
            BackendKind::ArliAi => ProviderSpec {
                name: "ArliAI",
                url: "https://api.arliai.com/v1/chat/completions",
                auth: AuthStyle::Bearer,
                wire: WireFormat::ChatCompletions,
                fallback_model: "arliai-model",
            },
            BackendKind::ShaleProtocol => ProviderSpec {
                name: "ShaleProtocol",
                url: "https://shale.live/v1/chat/completions",
                auth: AuthStyle::Bearer,
                wire: WireFormat::ChatCompletions,
                fallback_model: "shale-model",
            },
        }
    }

    /// Build the HTTP backend for this provider.
    pub fn build(
        self,
        store: Arc<CredentialStore>,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
    ) -> HttpBackend {
        HttpBackend::new(self.spec(), store, transport, retry)
    }
}

/// Backends for `kinds`, boxed for the dispatcher, in the given order.
pub fn build_backends(
    kinds: &[BackendKind],
    store: &Arc<CredentialStore>,
    transport: &Arc<dyn Transport>,
    retry: &RetryPolicy,
) -> Vec<Box<dyn Backend>> {
    kinds
        .iter()
        .map(|kind| {
            Box::new(kind.build(Arc::clone(store), Arc::clone(transport), retry.clone()))
                as Box<dyn Backend>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_override_wins() {
        assert_eq!(select_model(Some("m1"), Some("m2".into()), "m3"), "m1");
    }

    #[test]
    fn configured_default_before_fallback() {
        assert_eq!(select_model(None, Some("m2".into()), "m3"), "m2");
        assert_eq!(select_model(None, None, "m3"), "m3");
    }

    #[test]
    fn gemini_endpoint_embeds_model() {
        let spec = BackendKind::Gemini.spec();
        assert_eq!(
            spec.endpoint("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        // Chat endpoints carry the model in the body only.
        let spec = BackendKind::Groq.spec();
        assert_eq!(spec.endpoint("x"), "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in BackendKind::ALL {
            assert_eq!(BackendKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(BackendKind::from_name("groq"), Some(BackendKind::Groq));
        assert_eq!(BackendKind::from_name("nope"), None);
    }

    #[test]
    fn error_display_hides_body() {
        let err = BackendError::http(401, "invalid key sk-secret123");
        assert_eq!(err.to_string(), "transport failure (HTTP 401): remote returned 401");
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.body(), Some("invalid key [REDACTED]"));

        let err = BackendError::network("connection refused");
        assert_eq!(err.to_string(), "transport failure: connection refused");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn decode_error_keeps_sanitized_body() {
        let err = BackendError::decode("missing text", "{}");
        assert!(err.is_decode());
        assert_eq!(err.body(), Some("{}"));
        assert_eq!(err.to_string(), "decode failure: missing text");
        assert_eq!(err.message(), "missing text");
    }

    #[test]
    fn redacting_constructors_drop_the_sent_credential() {
        let err = BackendError::http_redacting(401, "unknown key plainkey12345", "plainkey12345");
        assert_eq!(err.body(), Some("unknown key [REDACTED]"));
        assert!(!err.to_string().contains("plainkey12345"));

        let err = BackendError::decode_redacting("no text", "echo plainkey12345", "plainkey12345");
        assert_eq!(err.body(), Some("echo [REDACTED]"));
    }
}
