pub mod backends;
pub mod dispatcher;
pub mod store;
pub mod transport;

// Re-exports for convenience
pub use backends::{
    AuthStyle, Backend, BackendError, BackendKind, HttpBackend, ProviderSpec, RetryOn, RetryPolicy,
};
pub use dispatcher::{DispatchError, Dispatcher, DispatcherBuilder, PairInfo};
pub use store::{CredentialStore, KeySnapshot, KeySource, ProviderConfig, ReloadPolicy};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
