use super::retry::RetryPolicy;
use super::{Backend, BackendError, ProviderSpec, WireFormat, compatible, gemini, select_model};
use crate::store::CredentialStore;
use crate::transport::{HttpRequest, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// A [`Backend`] speaking one provider's HTTP API, described by a [`ProviderSpec`].
pub struct HttpBackend {
    spec: ProviderSpec,
    credential: String,
    store: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl HttpBackend {
    pub fn new(
        spec: ProviderSpec,
        store: Arc<CredentialStore>,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            spec,
            credential: String::new(),
            store,
            transport,
            retry,
        }
    }

    /// Build the request for `prompt` against `model` with the current credential.
    pub fn build_request(&self, prompt: &str, model: &str) -> HttpRequest {
        let body = match self.spec.wire {
            WireFormat::Gemini => gemini::encode(prompt),
            WireFormat::ChatCompletions => compatible::encode(model, prompt),
        };
        let req = HttpRequest::new(self.spec.endpoint(model), body);
        self.spec.auth.apply(req, &self.credential)
    }

    /// Errors keep the raw body minus the credential this backend just sent.
    fn decode(&self, body: &str) -> Result<String, BackendError> {
        let decoded = match self.spec.wire {
            WireFormat::Gemini => gemini::decode(body),
            WireFormat::ChatCompletions => compatible::decode(body),
        };
        decoded.map_err(|e| BackendError::decode_redacting(e.message(), body, &self.credential))
    }

    async fn attempt(&self, request: &HttpRequest, model: &str, attempt: u32) -> Result<String, BackendError> {
        tracing::debug!(provider = self.spec.name, model, attempt, "sending request");
        let resp = self.transport.post_json(request).await?;
        if !resp.is_success() {
            let err = BackendError::http_redacting(resp.status, &resp.body, &self.credential);
            tracing::warn!(provider = self.spec.name, status = resp.status, attempt, "request failed");
            return Err(err);
        }
        self.decode(&resp.body).inspect_err(|e| {
            tracing::warn!(provider = self.spec.name, attempt, error = %e, "unreadable response");
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn set_credential(&mut self, credential: &str) {
        self.credential = credential.to_string();
    }

    async fn complete(&self, prompt: &str, model: Option<&str>) -> Result<String, BackendError> {
        let model = select_model(
            model,
            self.store.default_model_for(self.spec.name),
            self.spec.fallback_model,
        );
        let request = self.build_request(prompt, &model);
        let started = Instant::now();

        let result = self
            .retry
            .run(|attempt| self.attempt(&request, &model, attempt))
            .await;

        match &result {
            Ok(_) => tracing::debug!(
                provider = self.spec.name,
                model = %model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "completion received"
            ),
            Err(e) => tracing::warn!(
                provider = self.spec.name,
                model = %model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                attempts = self.retry.max_attempts(),
                error = %e,
                "giving up on provider"
            ),
        }
        result
    }
}
