//! Zenoh device gateway for Modbus field devices.
//!
//! Commands arrive on the command key, are routed to a named driver and
//! answered with exactly one envelope on the response or error key.
//!
//! # Key Expressions
//!
//! ```text
//! <main>/command     inbound command envelopes
//! <main>/response    successful replies
//! <main>/error       failed replies
//! <main>/@/status    gateway status
//! ```
//!
//! # Drivers
//!
//! - `modbus` - connection lifecycle, register/coil reads and writes, polling
//! - `port` - serial port enumeration (`detect`)

pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod drivers;
pub mod error;
pub mod invoker;
pub mod method;
pub mod polling;
pub mod registry;
pub mod transport;

pub use config::DeviceBridgeConfig;
pub use dispatcher::{Dispatcher, Reply};
pub use error::{GatewayError, Result};
pub use registry::{ConnectOutcome, ConnectionKey, ConnectionRegistry};
