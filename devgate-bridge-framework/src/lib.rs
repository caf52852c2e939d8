//! devgate Bridge Framework
//!
//! Lifecycle plumbing shared by gateway binaries that sit on a Zenoh bus.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`Publisher`] for publishing reply envelopes with automatic serialization
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`BridgeStatus`] for the running/offline report with drivers and channels
//!
//! # Example
//!
//! ```ignore
//! use devgate_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("device.json5");
//!     let config = MyGatewayConfig::load(&args.config)?;
//!
//!     let mut runner = BridgeRunner::new_with_args("device", config, Some(&args))
//!         .await?
//!         .with_status_publishing();
//!
//!     // Spawn the command loop
//!     runner.spawn_with_error("command-loop".to_string(), command_loop(runner.publisher()));
//!
//!     // Run until Ctrl+C
//!     runner.run(vec!["modbus".to_string()]).await
//! }
//! ```

mod args;
mod config;
mod error;
mod publisher;
mod runner;
mod status;

pub use args::BridgeArgs;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use publisher::Publisher;
pub use runner::BridgeRunner;
pub use status::{BridgeStatus, GatewayState, StatusChannels};

// Re-export commonly used types from devgate-common
pub use devgate_common::{
    CommandEnvelope, CorrelationId, Format, LoggingConfig, ReplyChannel, ResponseEnvelope,
    TopicConfig, Topics, ZenohConfig,
};
