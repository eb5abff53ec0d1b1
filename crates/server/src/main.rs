use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use shopassist_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
use shopassist_server::bootstrap::bootstrap_with_config;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "shopassist-server",
    about = "Shopping assistant chat server",
    after_help = "Examples:\n  shopassist-server\n  shopassist-server --config config/shopassist.toml --port 8080"
)]
struct Args {
    #[arg(long, help = "Path to a TOML config file (defaults to ./shopassist.toml if present)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Model provider: bedrock, openai or ollama")]
    provider: Option<LlmProvider>,
    #[arg(long, help = "Listen port")]
    port: Option<u16>,
    #[arg(long, help = "Base URL of the product/cart backend")]
    backend_url: Option<String>,
    #[arg(long, help = "Directory for saved conversation transcripts")]
    storage_dir: Option<PathBuf>,
    #[arg(long, help = "Log level filter, e.g. info or shopassist_agent=debug")]
    log_level: Option<String>,
}

impl Args {
    fn into_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                llm_provider: self.provider,
                backend_base_url: self.backend_url,
                server_port: self.port,
                storage_dir: self.storage_dir,
                log_level: self.log_level,
                ..ConfigOverrides::default()
            },
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let options = Args::parse().into_options();

    // Configuration problems are reported before logging exists, straight to stderr.
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            eprintln!("{}", error.guidance());
            return ExitCode::from(2);
        }
    };
    init_logging(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(
                event_name = "system.server.failed",
                error = %format!("{error:#}"),
                "server stopped with an error"
            );
            eprintln!("shopassist-server: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let app = bootstrap_with_config(config)?;
    app.serve(wait_for_shutdown()).await.context("http server")?;
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            event_name = "system.server.signal_error",
            error = %error,
            "could not listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    tracing::info!(event_name = "system.server.stopping", "shutdown signal received");
}
