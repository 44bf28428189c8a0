use std::path::PathBuf;

use clap::Parser;
use flowllm::config::{locate_dotenv, ServiceConfig};
use flowllm::service::http;
use flowllm::ServiceContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Start the flow engine's HTTP adapter.
#[derive(Parser, Debug)]
struct Cli {
    /// Path to a YAML configuration document.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Dotted `key.path=value` overrides applied on top of the config file,
    /// e.g. `http.port=9000`.
    #[arg(value_name = "key=value")]
    overrides: Vec<String>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,flowllm=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(dotenv_path) = locate_dotenv(&std::env::current_dir().unwrap_or_default()) {
        if let Err(error) = dotenvy::from_path(&dotenv_path) {
            tracing::warn!(%error, path = %dotenv_path.display(), "failed to load .env");
        }
    }

    let cli = Cli::parse();

    let mut config = if cli.config.is_file() {
        match ServiceConfig::from_yaml_file(&cli.config) {
            Ok(config) => config,
            Err(error) => {
                tracing::error!(%error, "failed to load config");
                return std::process::ExitCode::FAILURE;
            }
        }
    } else {
        ServiceConfig::default()
    };

    if let Err(error) = config.apply_overrides(&cli.overrides) {
        tracing::error!(%error, "failed to apply CLI overrides");
        return std::process::ExitCode::FAILURE;
    }

    let context = match ServiceContext::build(config) {
        Ok(context) => context.install(),
        Err(error) => {
            tracing::error!(%error, "failed to build service context");
            return std::process::ExitCode::FAILURE;
        }
    };

    match http::serve(context).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "http adapter exited with an error");
            std::process::ExitCode::FAILURE
        }
    }
}
