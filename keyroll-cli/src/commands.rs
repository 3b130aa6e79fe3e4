use crate::Settings;
use keyroll::backends::sanitize::mask_credential;
use keyroll::{Backend, BackendKind, CredentialStore, Dispatcher, ReqwestTransport, Transport};
use std::sync::Arc;
use std::time::Instant;

fn open_store(settings: &Settings) -> Arc<CredentialStore> {
    tracing::debug!(source = %settings.source.describe(), policy = ?settings.reload, "opening credential store");
    Arc::new(CredentialStore::new(settings.source.clone(), settings.reload))
}

fn transport(settings: &Settings) -> Arc<dyn Transport> {
    Arc::new(ReqwestTransport::new(settings.timeout))
}

/// Report a configuration problem instead of letting it pass as "no keys".
fn warn_if_degraded(store: &CredentialStore) {
    if let Some(err) = store.last_load_error() {
        eprintln!("Warning: could not load {}: {}", store.source().describe(), err);
    }
}

/// Dispatch one prompt and print the completion on stdout.
pub async fn run_complete(settings: &Settings, prompt: &str, model: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(settings);
    let mut builder = Dispatcher::builder(store.clone())
        .with_transport(transport(settings))
        .with_retry_policy(settings.retry.clone());
    if let Some(instruction) = &settings.instruction {
        builder = builder.instruction(instruction.clone());
    }
    let dispatcher = builder.with_default_backends().build();

    match dispatcher.complete(prompt, model).await {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) => {
            warn_if_degraded(&store);
            Err(e.into())
        }
    }
}

/// Print every provider in the document with its masked keys.
pub fn run_providers(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(settings);
    let snapshot = store.snapshot();
    warn_if_degraded(&store);

    let names = snapshot.providers();
    if names.is_empty() {
        println!("No providers configured in {}.", store.source().describe());
        return Ok(());
    }

    for name in names {
        let keys = snapshot.credentials_for(&name);
        let model = snapshot
            .default_model_for(&name)
            .unwrap_or_else(|| "(built-in default)".to_string());
        let known = if BackendKind::from_name(&name).is_some() { "" } else { "  [no backend]" };
        println!("{}  keys={}  model={}{}", name, keys.len(), model, known);
        for key in &keys {
            println!("    {}", mask_credential(key));
        }
    }
    Ok(())
}

/// Send `prompt` to each default backend once, using its first credential.
pub async fn run_check(settings: &Settings, prompt: &str) -> anyhow::Result<()> {
    let store = open_store(settings);
    let transport = transport(settings);
    warn_if_degraded(&store);

    let mut failures = 0usize;
    for kind in BackendKind::DEFAULT {
        let Some(key) = store.first_credential_for(kind.name()) else {
            println!("  {} - No credentials", kind.name());
            continue;
        };

        println!("\nChecking {} ({})...", kind.name(), mask_credential(&key));
        let mut backend = kind.build(store.clone(), transport.clone(), settings.retry.clone());
        backend.set_credential(&key);

        let started = Instant::now();
        match backend.complete(prompt, None).await {
            Ok(text) => {
                println!("  OK in {:?}", started.elapsed());
                println!("  {}", text.trim());
            }
            Err(e) => {
                failures += 1;
                println!("  FAILED in {:?}: {}", started.elapsed(), e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} provider(s) failed", failures);
    }
    Ok(())
}
