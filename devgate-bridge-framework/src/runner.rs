//! Bridge runner for lifecycle management.

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinHandle;

use devgate_common::{LoggingConfig, Topics, connect, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::publisher::Publisher;
use crate::status::StatusPublisher;

/// Runner that manages the lifecycle of a gateway on the bus.
///
/// Handles:
/// - Logging initialization
/// - Zenoh connection
/// - Task spawning and management
/// - Graceful shutdown on Ctrl+C
/// - Status publishing (optional)
pub struct BridgeRunner<C: BridgeConfig> {
    /// Gateway name for logging and status.
    name: String,
    /// Gateway version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Zenoh session.
    session: Arc<zenoh::Session>,
    /// Publisher for replies.
    publisher: Publisher,
    /// Status publisher (optional).
    status_publisher: Option<StatusPublisher>,
    /// Spawned tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a runner.
    ///
    /// This will:
    /// 1. Initialize logging based on config, with the CLI log level taking precedence
    /// 2. Connect to Zenoh
    /// 3. Create the publisher for the configured topics
    pub async fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                format: config.logging().format,
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %name, version = %version, "Starting gateway");

        let session = Arc::new(
            connect(config.zenoh())
                .await
                .map_err(|e| BridgeError::ZenohConnection(e.to_string()))?,
        );

        let topics = Topics::from_config(config.topics());
        let format = config.format();

        tracing::info!(
            command = %topics.command,
            response = %topics.response,
            error = %topics.error,
            encoding = format.mime_type(),
            "Bus topics resolved"
        );

        let publisher = Publisher::new(session.clone(), topics, format);

        Ok(Self {
            name,
            version,
            config,
            session,
            publisher,
            status_publisher: None,
            tasks: Vec::new(),
        })
    }

    /// Enable status publishing.
    ///
    /// When enabled, the runner will publish status messages on startup and shutdown.
    pub fn with_status_publishing(mut self) -> Self {
        self.status_publisher = Some(StatusPublisher::new(
            self.publisher.clone(),
            &self.name,
            &self.version,
        ));
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get a clone of the publisher.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Spawn a worker task that returns a Result.
    ///
    /// Errors are logged automatically.
    pub fn spawn_with_error<F, E>(&mut self, name: String, future: F)
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if let Err(e) = future.await {
                tracing::error!(worker = %name, error = %e, "Worker failed");
            }
        });
        self.tasks.push(handle);
    }

    /// Serve until Ctrl+C, advertising `drivers` in the running status.
    ///
    /// On the signal, spawned workers are aborted, the offline status is
    /// published and the Zenoh session is closed.
    pub async fn run(self, drivers: Vec<String>) -> Result<()> {
        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_running(drivers).await {
                tracing::warn!(error = %e, "Failed to publish running status");
            }
        }

        tracing::info!(
            bridge = %self.name,
            tasks = self.tasks.len(),
            "Gateway running. Press Ctrl+C to stop."
        );

        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }

        tracing::info!(bridge = %self.name, "Received shutdown signal");

        for task in &self.tasks {
            task.abort();
        }

        // Wait briefly for tasks to clean up
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_offline().await {
                tracing::warn!(error = %e, "Failed to publish offline status");
            }
        }

        if let Err(e) = self.session.close().await {
            tracing::warn!(error = %e, "Error closing Zenoh session");
        }

        tracing::info!(bridge = %self.name, "Bus session closed");

        Ok(())
    }
}
