//! Credential store: provider name -> ordered credentials and optional default model.
//!
//! Lookups never fail. A source that cannot be read or parsed degrades the
//! store to "no providers"; the failure is logged and kept for inspection via
//! [`CredentialStore::last_load_error`].

pub mod document;

pub use document::DocumentFormat;

use fs2::FileExt;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Immutable configuration for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    /// In document order. Duplicates are kept.
    pub credentials: Vec<String>,
    pub default_model: Option<String>,
}

/// One parsed credential document. Replaced wholesale on reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySnapshot {
    providers: HashMap<String, ProviderConfig>,
}

impl KeySnapshot {
    pub fn new(providers: HashMap<String, ProviderConfig>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.values().all(|p| p.credentials.is_empty())
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    pub fn credentials_for(&self, name: &str) -> Vec<String> {
        self.providers
            .get(name)
            .map(|p| p.credentials.clone())
            .unwrap_or_default()
    }

    pub fn default_model_for(&self, name: &str) -> Option<String> {
        self.providers.get(name).and_then(|p| p.default_model.clone())
    }

    /// Provider names that have at least one credential, sorted.
    pub fn providers(&self) -> Vec<String> {
        self.providers
            .values()
            .filter(|p| !p.credentials.is_empty())
            .map(|p| p.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Where the credential document comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// A file; `.json` parses as JSON, anything else as YAML.
    File(PathBuf),
    /// Document text held in memory (YAML, which also accepts JSON).
    Inline(String),
}

impl KeySource {
    /// `~/.keyroll/key_storage.yaml`
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".keyroll").join("key_storage.yaml")
    }

    fn format(&self) -> DocumentFormat {
        match self {
            KeySource::File(path) => match path.extension().and_then(|e| e.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
                _ => DocumentFormat::Yaml,
            },
            KeySource::Inline(_) => DocumentFormat::Yaml,
        }
    }

    /// Human-readable name of the source for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            KeySource::File(path) => path.display().to_string(),
            KeySource::Inline(_) => "<inline>".to_string(),
        }
    }

    fn read(&self) -> anyhow::Result<String> {
        match self {
            KeySource::File(path) => read_shared(path),
            KeySource::Inline(text) => Ok(text.clone()),
        }
    }
}

/// Read a file under a shared advisory lock so a writer holding the exclusive
/// lock cannot hand us a half-written document.
fn read_shared(path: &Path) -> anyhow::Result<String> {
    let mut file = fs::File::open(path)?;
    FileExt::lock_shared(&file)?;
    let mut content = String::new();
    let read = file.read_to_string(&mut content);
    let _ = FileExt::unlock(&file);
    read?;
    Ok(content)
}

/// When the store goes back to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPolicy {
    /// Re-read on every query.
    #[default]
    Always,
    /// Serve the cached snapshot until it is older than the given duration.
    Ttl(Duration),
    /// Load once; reload only after [`CredentialStore::invalidate`].
    Manual,
}

struct Cached {
    loaded_at: Instant,
    snapshot: Arc<KeySnapshot>,
}

#[derive(Default)]
struct CacheState {
    cached: Option<Cached>,
    last_error: Option<String>,
}

/// Thread-safe credential store over a [`KeySource`].
pub struct CredentialStore {
    source: KeySource,
    policy: ReloadPolicy,
    state: RwLock<CacheState>,
}

impl CredentialStore {
    pub fn new(source: KeySource, policy: ReloadPolicy) -> Self {
        Self {
            source,
            policy,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// File-backed store that re-reads the file on every query.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(KeySource::File(path.into()), ReloadPolicy::Always)
    }

    /// Store over in-memory document text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(KeySource::Inline(text.into()), ReloadPolicy::Always)
    }

    pub fn policy(&self) -> ReloadPolicy {
        self.policy
    }

    pub fn source(&self) -> &KeySource {
        &self.source
    }

    /// Current snapshot, reloading according to the policy.
    pub fn snapshot(&self) -> Arc<KeySnapshot> {
        if let Some(snapshot) = self.cached_snapshot() {
            return snapshot;
        }

        let snapshot = Arc::new(self.load());
        if self.policy != ReloadPolicy::Always {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.cached = Some(Cached {
                loaded_at: Instant::now(),
                snapshot: Arc::clone(&snapshot),
            });
        }
        snapshot
    }

    fn cached_snapshot(&self) -> Option<Arc<KeySnapshot>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let cached = state.cached.as_ref()?;
        let fresh = match self.policy {
            ReloadPolicy::Always => false,
            ReloadPolicy::Ttl(ttl) => cached.loaded_at.elapsed() < ttl,
            ReloadPolicy::Manual => true,
        };
        fresh.then(|| Arc::clone(&cached.snapshot))
    }

    /// Drop the cached snapshot; the next query reloads.
    pub fn invalidate(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.cached = None;
    }

    /// Error text of the most recent load, if it degraded to empty.
    pub fn last_load_error(&self) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.last_error.clone()
    }

    fn load(&self) -> KeySnapshot {
        let result = self
            .source
            .read()
            .and_then(|text| document::parse(&text, self.source.format()));

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(snapshot) => {
                state.last_error = None;
                snapshot
            }
            Err(e) => {
                tracing::warn!(
                    source = %self.source.describe(),
                    error = %format!("{:#}", e),
                    "credential source unusable, continuing with no credentials"
                );
                state.last_error = Some(format!("{:#}", e));
                KeySnapshot::default()
            }
        }
    }

    /// Credentials for `provider`, in order. Empty for unknown providers.
    pub fn credentials_for(&self, provider: &str) -> Vec<String> {
        self.snapshot().credentials_for(provider)
    }

    pub fn default_model_for(&self, provider: &str) -> Option<String> {
        self.snapshot().default_model_for(provider)
    }

    pub fn first_credential_for(&self, provider: &str) -> Option<String> {
        self.credentials_for(provider).into_iter().next()
    }

    /// Every credential of every provider, providers in name order.
    pub fn all_credentials(&self) -> Vec<String> {
        let snapshot = self.snapshot();
        snapshot
            .providers()
            .iter()
            .flat_map(|name| snapshot.credentials_for(name))
            .collect()
    }

    /// Provider names with at least one credential, sorted.
    pub fn providers(&self) -> Vec<String> {
        self.snapshot().providers()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("source", &self.source.describe())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "api_keys:\n  Gemini:\n    keys: [g1, g2]\n    default_model: gemini-2.5-flash\n  Groq: [q1]\n";

    fn tmp_store(contents: &str, policy: ReloadPolicy) -> (tempfile::TempDir, PathBuf, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key_storage.yaml");
        fs::write(&path, contents).unwrap();
        let store = CredentialStore::new(KeySource::File(path.clone()), policy);
        (dir, path, store)
    }

    #[test]
    fn unknown_provider_is_empty() {
        let store = CredentialStore::from_text(DOC);
        assert!(store.credentials_for("X").is_empty());
        assert_eq!(store.default_model_for("X"), None);
        assert_eq!(store.first_credential_for("X"), None);
    }

    #[test]
    fn lookups_follow_document() {
        let store = CredentialStore::from_text(DOC);
        assert_eq!(store.credentials_for("Gemini"), vec!["g1", "g2"]);
        assert_eq!(store.default_model_for("Gemini").as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(store.first_credential_for("Groq").as_deref(), Some("q1"));
        assert_eq!(store.providers(), vec!["Gemini", "Groq"]);
        assert_eq!(store.all_credentials(), vec!["g1", "g2", "q1"]);
    }

    #[test]
    fn missing_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::from_path(dir.path().join("absent.yaml"));
        assert!(store.credentials_for("Gemini").is_empty());
        assert!(store.snapshot().is_empty());
        assert!(store.last_load_error().is_some());
    }

    #[test]
    fn malformed_document_degrades_to_empty() {
        let store = CredentialStore::from_text("api_keys: [not, a, mapping]");
        assert!(store.providers().is_empty());
        let err = store.last_load_error().unwrap();
        assert!(err.contains("api_keys"), "{}", err);
    }

    #[test]
    fn recovery_clears_last_error() {
        let (_dir, path, store) = tmp_store("garbage: [", ReloadPolicy::Always);
        assert!(store.providers().is_empty());
        assert!(store.last_load_error().is_some());

        fs::write(&path, DOC).unwrap();
        assert_eq!(store.providers(), vec!["Gemini", "Groq"]);
        assert_eq!(store.last_load_error(), None);
    }

    #[test]
    fn always_policy_sees_every_change() {
        let (_dir, path, store) = tmp_store(DOC, ReloadPolicy::Always);
        assert_eq!(store.credentials_for("Groq"), vec!["q1"]);
        fs::write(&path, "api_keys:\n  Groq: [q1, q2]\n").unwrap();
        assert_eq!(store.credentials_for("Groq"), vec!["q1", "q2"]);
    }

    #[test]
    fn manual_policy_reloads_only_on_invalidate() {
        let (_dir, path, store) = tmp_store(DOC, ReloadPolicy::Manual);
        assert_eq!(store.credentials_for("Groq"), vec!["q1"]);

        fs::write(&path, "api_keys:\n  Groq: [q9]\n").unwrap();
        assert_eq!(store.credentials_for("Groq"), vec!["q1"]);

        store.invalidate();
        assert_eq!(store.credentials_for("Groq"), vec!["q9"]);
    }

    #[test]
    fn ttl_policy_serves_cache_until_expiry() {
        let (_dir, path, store) = tmp_store(DOC, ReloadPolicy::Ttl(Duration::from_secs(3600)));
        assert_eq!(store.credentials_for("Groq"), vec!["q1"]);
        fs::write(&path, "api_keys:\n  Groq: [q9]\n").unwrap();
        assert_eq!(store.credentials_for("Groq"), vec!["q1"]);

        let (_dir, path, store) = tmp_store(DOC, ReloadPolicy::Ttl(Duration::ZERO));
        assert_eq!(store.credentials_for("Groq"), vec!["q1"]);
        fs::write(&path, "api_keys:\n  Groq: [q9]\n").unwrap();
        assert_eq!(store.credentials_for("Groq"), vec!["q9"]);
    }

    #[test]
    fn json_extension_selects_json_parser() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        fs::write(&path, r#"{"api_keys":{"Groq":"q1"}}"#).unwrap();
        let store = CredentialStore::from_path(&path);
        assert_eq!(store.credentials_for("Groq"), vec!["q1"]);
    }

    #[test]
    fn concurrent_readers_see_consistent_snapshots() {
        let store = Arc::new(CredentialStore::from_text(DOC));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        assert_eq!(store.credentials_for("Gemini"), vec!["g1", "g2"]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
