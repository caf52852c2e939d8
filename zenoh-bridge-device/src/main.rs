//! Zenoh device gateway.
//!
//! Receives command envelopes over Zenoh and executes them against Modbus
//! field devices and local serial ports.

use std::sync::Arc;

use anyhow::Result;
use devgate_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};

use zenoh_bridge_device::bus::run_command_loop;
use zenoh_bridge_device::config::DeviceBridgeConfig;
use zenoh_bridge_device::dispatcher::Dispatcher;
use zenoh_bridge_device::drivers::{ModbusDriver, PortDriver};
use zenoh_bridge_device::registry::ConnectionRegistry;
use zenoh_bridge_device::transport::TokioModbusConnector;

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("device.json5");

    let config = DeviceBridgeConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;

    let runner = BridgeRunner::new_with_args("device", config, Some(&args))
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let mut runner = runner.with_status_publishing();

    let modbus_config = runner.config().modbus.clone();
    let connector = Arc::new(TokioModbusConnector::new(
        modbus_config.connect_timeout(),
        modbus_config.request_timeout(),
    ));
    let registry = Arc::new(
        ConnectionRegistry::new(connector).with_close_timeout(modbus_config.request_timeout()),
    );

    let mut builder =
        Dispatcher::builder().driver(Arc::new(ModbusDriver::new(registry.clone(), modbus_config)));
    if runner.config().serial.enabled {
        builder = builder.driver(Arc::new(PortDriver::system()));
    }
    let dispatcher = builder.build();

    let drivers = dispatcher.driver_names();
    tracing::info!(drivers = ?drivers, "Drivers registered");

    runner.spawn_with_error(
        "command-loop".to_string(),
        run_command_loop(runner.publisher(), dispatcher),
    );

    let result = runner.run(drivers).await.map_err(|e| anyhow::anyhow!("{}", e));

    registry.shutdown().await;

    result
}
