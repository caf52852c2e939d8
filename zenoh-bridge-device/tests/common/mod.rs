//! In-memory Modbus device shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use zenoh_bridge_device::config::ModbusConfig;
use zenoh_bridge_device::dispatcher::Dispatcher;
use zenoh_bridge_device::drivers::ModbusDriver;
use zenoh_bridge_device::registry::ConnectionRegistry;
use zenoh_bridge_device::transport::{
    ConnectRequest, Connector, ModbusTransport, SerialSettings, TransportError, TransportKind,
};

/// Observable state behind every transport the fake connector opens.
#[derive(Default)]
pub struct FakeDevice {
    pub opens: AtomicUsize,
    pub calls: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_open: AtomicBool,
    pub fail_calls: AtomicBool,
    pub fail_close: AtomicBool,
    /// Every call takes this long.
    pub latency_ms: AtomicU64,
    /// Calls never return.
    pub stall: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    registers: Mutex<HashMap<u16, u16>>,
    coils: Mutex<HashMap<u16, bool>>,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Most calls ever observed inside the transport at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Occupy the device for the configured latency, or forever when stalled.
    async fn busy(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight { device: self };

        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        guard
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.registers.lock().insert(address, value);
    }

    pub fn register(&self, address: u16) -> u16 {
        self.registers.lock().get(&address).copied().unwrap_or(0)
    }

    pub fn coil(&self, address: u16) -> bool {
        self.coils.lock().get(&address).copied().unwrap_or(false)
    }

    fn call(&self) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(TransportError::Io("Connection reset by peer".to_string()));
        }
        Ok(())
    }

    fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        self.call()?;
        let registers = self.registers.lock();
        Ok((address..address + count)
            .map(|a| registers.get(&a).copied().unwrap_or(0))
            .collect())
    }

    fn read_bits(&self, address: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        self.call()?;
        let coils = self.coils.lock();
        Ok((address..address + count)
            .map(|a| coils.get(&a).copied().unwrap_or(false))
            .collect())
    }
}

struct InFlight<'a> {
    device: &'a FakeDevice,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.device.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeConnector {
    pub device: Arc<FakeDevice>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(
        &self,
        _request: &ConnectRequest,
    ) -> Result<Box<dyn ModbusTransport>, TransportError> {
        if self.device.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Io("Connection refused".to_string()));
        }
        self.device.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTransport {
            device: self.device.clone(),
        }))
    }
}

struct FakeTransport {
    device: Arc<FakeDevice>,
}

#[async_trait]
impl ModbusTransport for FakeTransport {
    async fn read_coils(&mut self, address: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        let _busy = self.device.busy().await;
        self.device.read_bits(address, count)
    }

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<bool>, TransportError> {
        let _busy = self.device.busy().await;
        self.device.read_bits(address, count)
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let _busy = self.device.busy().await;
        self.device.read_registers(address, count)
    }

    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let _busy = self.device.busy().await;
        self.device.read_registers(address, count)
    }

    async fn write_single_coil(&mut self, address: u16, state: bool) -> Result<(), TransportError> {
        let _busy = self.device.busy().await;
        self.device.call()?;
        self.device.coils.lock().insert(address, state);
        Ok(())
    }

    async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        let _busy = self.device.busy().await;
        self.device.call()?;
        self.device.registers.lock().insert(address, value);
        Ok(())
    }

    async fn write_multiple_coils(
        &mut self,
        address: u16,
        states: &[bool],
    ) -> Result<(), TransportError> {
        let _busy = self.device.busy().await;
        self.device.call()?;
        let mut coils = self.device.coils.lock();
        for (a, s) in (address..).zip(states) {
            coils.insert(a, *s);
        }
        Ok(())
    }

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        let _busy = self.device.busy().await;
        self.device.call()?;
        let mut registers = self.device.registers.lock();
        for (a, v) in (address..).zip(values) {
            registers.insert(a, *v);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.device.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Io("Port busy".to_string()));
        }
        self.device.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn registry(device: &Arc<FakeDevice>) -> Arc<ConnectionRegistry> {
    Arc::new(ConnectionRegistry::new(Arc::new(FakeConnector {
        device: device.clone(),
    })))
}

pub fn tcp(address: &str, unit_id: u8) -> ConnectRequest {
    ConnectRequest {
        kind: TransportKind::Tcp,
        address: address.to_string(),
        unit_id,
        tcp_port: 502,
        serial: SerialSettings::default(),
    }
}

/// Dispatcher with the `modbus` driver over a fake device.
pub fn gateway(device: &Arc<FakeDevice>) -> (Dispatcher, Arc<ConnectionRegistry>) {
    let registry = registry(device);
    let dispatcher = Dispatcher::builder()
        .driver(Arc::new(ModbusDriver::new(
            registry.clone(),
            ModbusConfig::default(),
        )))
        .build();
    (dispatcher, registry)
}
