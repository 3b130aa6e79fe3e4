mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use keyroll::{KeySource, ReloadPolicy, RetryOn, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "keyroll", version, about = "Rotate prompts across LLM providers and API keys")]
struct Cli {
    /// Credential document (YAML, or JSON with a .json extension)
    #[arg(long, env = "KEYROLL_KEYS", global = true)]
    keys: Option<PathBuf>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value = "60", global = true)]
    timeout: u64,

    /// Cache the credential document for this many seconds (default: reload on every call)
    #[arg(long, global = true)]
    cache_ttl: Option<u64>,

    /// Retries per provider after the first attempt
    #[arg(long, default_value = "2", global = true)]
    retries: u32,

    /// Which failures earn a retry
    #[arg(long, value_enum, default_value = "any", global = true)]
    retry_on: RetryOnArg,

    /// Text prepended to every prompt
    #[arg(long, global = true)]
    instruction: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt through the rotation and print the completion
    Complete {
        prompt: String,

        /// Model to request instead of the configured default
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List configured providers and their (masked) keys
    Providers,

    /// Send one prompt to every provider with its first key, bypassing rotation
    Check {
        #[arg(short, long, default_value = "Say hello from the test!")]
        prompt: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RetryOnArg {
    Any,
    Transient,
    Transport,
}

impl From<RetryOnArg> for RetryOn {
    fn from(arg: RetryOnArg) -> Self {
        match arg {
            RetryOnArg::Any => RetryOn::AnyFailure,
            RetryOnArg::Transient => RetryOn::Transient,
            RetryOnArg::Transport => RetryOn::TransportOnly,
        }
    }
}

/// Settings shared by every command.
pub struct Settings {
    pub source: KeySource,
    pub reload: ReloadPolicy,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub instruction: Option<String>,
}

impl Cli {
    fn settings(&self) -> Settings {
        let path = self.keys.clone().unwrap_or_else(KeySource::default_path);
        let reload = match self.cache_ttl {
            Some(secs) => ReloadPolicy::Ttl(Duration::from_secs(secs)),
            None => ReloadPolicy::Always,
        };
        Settings {
            source: KeySource::File(path),
            reload,
            timeout: Duration::from_secs(self.timeout),
            retry: RetryPolicy::uniform(self.retries).with_retry_on(self.retry_on.into()),
            instruction: self.instruction.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyroll=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings();

    match cli.command {
        Commands::Complete { prompt, model } => {
            commands::run_complete(&settings, &prompt, model.as_deref()).await?;
        }
        Commands::Providers => {
            commands::run_providers(&settings)?;
        }
        Commands::Check { prompt } => {
            commands::run_check(&settings, &prompt).await?;
        }
    }

    Ok(())
}
