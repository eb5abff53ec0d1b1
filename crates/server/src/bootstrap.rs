use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use shopassist_agent::{AgentError, MessageProcessor, SessionRegistry, ShoppingAgentFactory};
use shopassist_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::chat::AppState;

pub struct Application {
    pub config: AppConfig,
    pub registry: Arc<SessionRegistry>,
    pub processor: MessageProcessor,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent runtime could not be initialized: {0}")]
    Agent(#[from] AgentError),
    #[error("could not bind `{address}`: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("http server terminated: {0}")]
    Serve(#[source] std::io::Error),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let factory = ShoppingAgentFactory::from_config(&config)?;
    let registry = Arc::new(SessionRegistry::new(Arc::new(factory)));
    let processor = MessageProcessor::new(Arc::clone(&registry));

    info!(
        event_name = "system.bootstrap.ready",
        storage_dir = %config.sessions.storage_dir.display(),
        backend = %config.backend.base_url,
        "agent runtime initialized"
    );

    Ok(Application { config, registry, processor })
}

impl Application {
    /// Serves until `shutdown` resolves, then drains in-flight requests for at most the
    /// configured grace period.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), BootstrapError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = format!("{}:{}", self.config.server.bind_address, self.config.server.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| BootstrapError::Bind { address: address.clone(), source })?;

        let sweeper = self
            .config
            .sessions
            .idle_timeout_secs
            .map(|secs| self.registry.spawn_idle_sweeper(Duration::from_secs(secs)));

        let app = crate::router(
            AppState { processor: self.processor.clone() },
            &self.config.server.allowed_origins,
        );
        info!(event_name = "system.server.started", bind_address = %address, "chat server listening");

        let grace = Duration::from_secs(self.config.server.graceful_shutdown_secs);
        let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown.await;
            let _ = signalled_tx.send(());
        })
        .into_future();

        let result = tokio::select! {
            result = server => result.map_err(BootstrapError::Serve),
            () = async {
                if signalled_rx.await.is_ok() {
                    tokio::time::sleep(grace).await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {
                warn!(
                    event_name = "system.server.shutdown_timeout",
                    grace_secs = grace.as_secs(),
                    "in-flight requests did not finish within the grace period"
                );
                Ok(())
            }
        };

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        info!(event_name = "system.server.stopped", "chat server stopped");
        result
    }
}
