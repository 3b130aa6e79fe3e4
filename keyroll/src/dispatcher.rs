//! Round-robin dispatch with failover across every (backend, credential) pair.
//!
//! The pool is the concatenation, in backend registration order, of each
//! backend's credentials. A call starts at the rotation cursor and walks the
//! pool once; the first success wins. Win or lose, the cursor then moves
//! forward by exactly one, so a pair that is down this round still gets its
//! turn next round.
//!
//! Calls are single-flight: the state lock is held for the whole call, so a
//! second caller waits until the first has returned.

use crate::backends::sanitize::mask_credential;
use crate::backends::{Backend, BackendError, BackendKind, RetryPolicy, build_backends};
use crate::store::CredentialStore;
use crate::transport::{ReqwestTransport, Transport};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;

/// Prepended once to every prompt.
pub const DEFAULT_INSTRUCTION: &str = "Please answer in English.\n";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no providers or credentials configured")]
    NoPairsConfigured,

    #[error("all {attempted} provider/credential pairs failed; last error: {last}")]
    AllPairsExhausted { attempted: usize, last: BackendError },
}

/// One pool entry as shown to humans. The credential is masked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairInfo {
    pub provider: String,
    pub credential: String,
}

/// A pool entry. `model` is the provider's configured default, read from the
/// same snapshot as the credential.
struct Pair {
    backend: usize,
    credential: String,
    model: Option<String>,
}

struct DispatchState {
    cursor: usize,
    backends: Vec<Box<dyn Backend>>,
}

pub struct Dispatcher {
    store: Arc<CredentialStore>,
    instruction: String,
    state: Mutex<DispatchState>,
}

impl Dispatcher {
    pub fn builder(store: Arc<CredentialStore>) -> DispatcherBuilder {
        DispatcherBuilder::new(store)
    }

    /// Dispatcher over the default backends, talking HTTP through `reqwest`.
    pub fn with_defaults(store: Arc<CredentialStore>) -> Self {
        DispatcherBuilder::new(store).with_default_backends().build()
    }

    /// Current rotation cursor. Waits for any in-flight call.
    pub async fn cursor(&self) -> usize {
        self.state.lock().await.cursor
    }

    /// The pool a call would use right now, in rotation order from index 0.
    pub async fn pool(&self) -> Vec<PairInfo> {
        let state = self.state.lock().await;
        self.build_pool(&state.backends)
            .into_iter()
            .map(|pair| PairInfo {
                provider: state.backends[pair.backend].name().to_string(),
                credential: mask_credential(&pair.credential),
            })
            .collect()
    }

    fn build_pool(&self, backends: &[Box<dyn Backend>]) -> Vec<Pair> {
        let snapshot = self.store.snapshot();
        backends
            .iter()
            .enumerate()
            .flat_map(|(index, backend)| {
                let model = snapshot.default_model_for(backend.name());
                snapshot
                    .credentials_for(backend.name())
                    .into_iter()
                    .map(move |credential| Pair {
                        backend: index,
                        credential,
                        model: model.clone(),
                    })
            })
            .collect()
    }

    /// Send `prompt` to the next pair in rotation, failing over through the
    /// rest of the pool.
    pub async fn complete(&self, prompt: &str, model: Option<&str>) -> Result<String, DispatchError> {
        let span = tracing::info_span!(
            "dispatch",
            request_id = %uuid::Uuid::new_v4(),
            pool_size = tracing::field::Empty,
        );
        self.complete_locked(prompt, model).instrument(span).await
    }

    async fn complete_locked(&self, prompt: &str, model: Option<&str>) -> Result<String, DispatchError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let pool = self.build_pool(&state.backends);
        if pool.is_empty() {
            tracing::warn!("no provider/credential pairs configured");
            return Err(DispatchError::NoPairsConfigured);
        }
        let size = pool.len();
        tracing::Span::current().record("pool_size", size);

        let prompt = format!("{}{}", self.instruction, prompt);
        let start = state.cursor % size;
        let mut last = None;

        for attempt in 0..size {
            let index = (start + attempt) % size;
            let pair = &pool[index];
            let backend = &mut state.backends[pair.backend];
            backend.set_credential(&pair.credential);

            tracing::debug!(provider = backend.name(), pair = index, attempt, "trying pair");
            let pair_model = model.or(pair.model.as_deref());
            match backend.complete(&prompt, pair_model).await {
                Ok(text) => {
                    if attempt > 0 {
                        tracing::info!(provider = backend.name(), pair = index, attempt, "failover succeeded");
                    }
                    state.cursor = (start + 1) % size;
                    return Ok(text);
                }
                Err(e) => {
                    tracing::warn!(provider = backend.name(), pair = index, error = %e, "pair failed, trying next");
                    last = Some(e);
                }
            }
        }

        state.cursor = (start + 1) % size;
        tracing::error!(attempted = size, "all provider/credential pairs failed");
        Err(DispatchError::AllPairsExhausted {
            attempted: size,
            last: last.unwrap_or_else(|| BackendError::network("no attempt made")),
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("store", &self.store)
            .field("instruction", &self.instruction)
            .finish_non_exhaustive()
    }
}

pub struct DispatcherBuilder {
    store: Arc<CredentialStore>,
    backends: Vec<Box<dyn Backend>>,
    instruction: String,
    cursor: usize,
    transport: Option<Arc<dyn Transport>>,
    retry: RetryPolicy,
}

impl DispatcherBuilder {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self {
            store,
            backends: Vec::new(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            cursor: 0,
            transport: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Transport used by backends added through [`Self::with_kinds`]. Defaults
    /// to a `reqwest` client with a 60 s timeout.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Retry policy for backends added through [`Self::with_kinds`].
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Register one backend after those already added.
    pub fn with_backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Register the built-in HTTP backends for `kinds`, in order.
    pub fn with_kinds(mut self, kinds: &[BackendKind]) -> Self {
        let transport = self
            .transport
            .get_or_insert_with(|| Arc::new(ReqwestTransport::default()) as Arc<dyn Transport>)
            .clone();
        let built = build_backends(kinds, &self.store, &transport, &self.retry);
        self.backends.extend(built);
        self
    }

    /// Gemini, HuggingFace, OpenRouter, Groq.
    pub fn with_default_backends(self) -> Self {
        self.with_kinds(&BackendKind::DEFAULT)
    }

    /// Text prepended to every prompt. Empty disables the prefix.
    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Starting cursor position.
    pub fn cursor(mut self, cursor: usize) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            store: self.store,
            instruction: self.instruction,
            state: Mutex::new(DispatchState {
                cursor: self.cursor,
                backends: self.backends,
            }),
        }
    }
}
