//! Modbus transport capability.
//!
//! The core only ever talks to a device through [`ModbusTransport`], opened by
//! a [`Connector`]. [`TokioModbusConnector`] is the production implementation
//! on top of `tokio-modbus` (TCP and RTU over `tokio-serial`).

use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

/// Transport-level failures. The message is passed through to callers unchanged.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// I/O or protocol failure reported by the stack.
    #[error("{0}")]
    Io(String),

    /// The device answered with a Modbus exception.
    #[error("Modbus exception: {0}")]
    Exception(String),

    /// Connect did not finish in time.
    #[error("Connection timeout")]
    Timeout,

    /// The device did not answer a request in time.
    #[error("Request timeout")]
    RequestTimeout,

    /// Address could not be resolved.
    #[error("Invalid address: {0}")]
    Address(String),

    /// Serial port could not be opened.
    #[error("Serial open failed: {0}")]
    Serial(String),
}

/// Transport kind requested on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    #[serde(rename = "RTU", alias = "rtu")]
    Rtu,
    #[serde(rename = "TCP", alias = "tcp")]
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Rtu => f.write_str("RTU"),
            TransportKind::Tcp => f.write_str("TCP"),
        }
    }
}

/// Serial line settings for RTU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    /// "none", "even" or "odd"
    pub parity: String,
    pub stop_bits: u8,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            parity: "none".to_string(),
            stop_bits: 1,
        }
    }
}

/// Everything needed to open one device channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub kind: TransportKind,
    /// Host (TCP) or serial device path (RTU).
    pub address: String,
    pub unit_id: u8,
    /// TCP port, used when `address` carries none.
    pub tcp_port: u16,
    pub serial: SerialSettings,
}

/// An open channel to one device.
#[async_trait]
pub trait ModbusTransport: Send {
    async fn read_coils(&mut self, address: u16, count: u16) -> Result<Vec<bool>, TransportError>;

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<bool>, TransportError>;

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    async fn write_single_coil(&mut self, address: u16, state: bool)
    -> Result<(), TransportError>;

    async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError>;

    async fn write_multiple_coils(
        &mut self,
        address: u16,
        states: &[bool],
    ) -> Result<(), TransportError>;

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError>;

    /// Release the underlying channel.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, request: &ConnectRequest)
    -> Result<Box<dyn ModbusTransport>, TransportError>;
}

/// Connector backed by `tokio-modbus`.
#[derive(Debug, Clone)]
pub struct TokioModbusConnector {
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl TokioModbusConnector {
    /// `request_timeout` bounds every call on an opened transport, close included.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }

    async fn open_tcp(&self, request: &ConnectRequest) -> Result<Context, TransportError> {
        let addr = resolve(&request.address, request.tcp_port).await?;
        let slave = Slave(request.unit_id);

        tracing::debug!(%addr, unit = request.unit_id, "Opening Modbus TCP connection");

        tokio::time::timeout(self.connect_timeout, tcp::connect_slave(addr, slave))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn open_rtu(&self, request: &ConnectRequest) -> Result<Context, TransportError> {
        let settings = &request.serial;

        let parity = match settings.parity.to_lowercase().as_str() {
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let stop_bits = match settings.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        let data_bits = match settings.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        tracing::debug!(
            port = %request.address,
            baud_rate = settings.baud_rate,
            unit = request.unit_id,
            "Opening Modbus RTU connection"
        );

        let builder = tokio_serial::new(&request.address, settings.baud_rate)
            .parity(parity)
            .stop_bits(stop_bits)
            .data_bits(data_bits)
            .timeout(self.connect_timeout);

        let serial = tokio_serial::SerialStream::open(&builder)
            .map_err(|e| TransportError::Serial(e.to_string()))?;

        Ok(rtu::attach_slave(serial, Slave(request.unit_id)))
    }
}

/// Accepts "host", "host:port", or a literal IP or socket address.
async fn resolve(address: &str, default_port: u16) -> Result<SocketAddr, TransportError> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    let target = if address.contains(':') {
        address.to_string()
    } else {
        format!("{}:{}", address, default_port)
    };

    tokio::net::lookup_host(target)
        .await
        .map_err(|e| TransportError::Address(format!("{}: {}", address, e)))?
        .next()
        .ok_or_else(|| TransportError::Address(address.to_string()))
}

#[async_trait]
impl Connector for TokioModbusConnector {
    async fn open(
        &self,
        request: &ConnectRequest,
    ) -> Result<Box<dyn ModbusTransport>, TransportError> {
        let ctx = match request.kind {
            TransportKind::Tcp => self.open_tcp(request).await?,
            TransportKind::Rtu => self.open_rtu(request)?,
        };
        Ok(Box::new(ContextTransport {
            ctx,
            request_timeout: self.request_timeout,
        }))
    }
}

/// [`ModbusTransport`] over a `tokio-modbus` client context.
struct ContextTransport {
    ctx: Context,
    request_timeout: Duration,
}

/// Flatten the stack's nested result (transport error, then exception code).
fn flatten<T, E: fmt::Display, X: fmt::Debug>(
    result: Result<Result<T, X>, E>,
) -> Result<T, TransportError> {
    result
        .map_err(|e| TransportError::Io(e.to_string()))?
        .map_err(|code| TransportError::Exception(format!("{:?}", code)))
}

/// The stack has no read timeout of its own; a silent device would hold the
/// transport forever.
async fn bounded<T, E, X, F>(limit: Duration, request: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<Result<T, X>, E>>,
    E: fmt::Display,
    X: fmt::Debug,
{
    let result = tokio::time::timeout(limit, request)
        .await
        .map_err(|_| TransportError::RequestTimeout)?;
    flatten(result)
}

#[async_trait]
impl ModbusTransport for ContextTransport {
    async fn read_coils(&mut self, address: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        bounded(self.request_timeout, self.ctx.read_coils(address, count)).await
    }

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<bool>, TransportError> {
        bounded(self.request_timeout, self.ctx.read_discrete_inputs(address, count)).await
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        bounded(self.request_timeout, self.ctx.read_holding_registers(address, count)).await
    }

    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        bounded(self.request_timeout, self.ctx.read_input_registers(address, count)).await
    }

    async fn write_single_coil(
        &mut self,
        address: u16,
        state: bool,
    ) -> Result<(), TransportError> {
        bounded(self.request_timeout, self.ctx.write_single_coil(address, state)).await
    }

    async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        bounded(self.request_timeout, self.ctx.write_single_register(address, value)).await
    }

    async fn write_multiple_coils(
        &mut self,
        address: u16,
        states: &[bool],
    ) -> Result<(), TransportError> {
        bounded(self.request_timeout, self.ctx.write_multiple_coils(address, states)).await
    }

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        bounded(self.request_timeout, self.ctx.write_multiple_registers(address, values)).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        tokio::time::timeout(self.request_timeout, self.ctx.disconnect())
            .await
            .map_err(|_| TransportError::RequestTimeout)?
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}
