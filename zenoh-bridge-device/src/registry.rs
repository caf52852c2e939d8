//! Registry of live device connections.
//!
//! At most one [`DeviceConnection`] exists per (address, unit id). Connect and
//! disconnect of the same key are serialized by a per-key lifecycle guard so an
//! entry is never observed half-open or half torn down. Work on one device never
//! waits on another device's guard; lookups only take the read side of the map.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};
use crate::polling::{PollEntry, PollKey};
use crate::transport::{ConnectRequest, Connector, ModbusTransport, TransportError, TransportKind};

/// How long disconnect and shutdown wait for an in-flight call to release a transport.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity of a device connection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionKey {
    pub address: String,
    #[serde(rename = "slaveId")]
    pub unit_id: u8,
}

impl ConnectionKey {
    pub fn new(address: impl Into<String>, unit_id: u8) -> Self {
        Self {
            address: address.into(),
            unit_id,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.address, self.unit_id)
    }
}

/// One open channel to one device.
pub struct DeviceConnection {
    key: ConnectionKey,
    kind: TransportKind,
    connected: AtomicBool,
    transport: AsyncMutex<Box<dyn ModbusTransport>>,
    polls: Mutex<BTreeMap<PollKey, PollEntry>>,
}

impl fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("connected", &self.is_connected())
            .field("polls", &self.polls.lock().len())
            .finish()
    }
}

impl DeviceConnection {
    fn new(key: ConnectionKey, kind: TransportKind, transport: Box<dyn ModbusTransport>) -> Self {
        Self {
            key,
            kind,
            connected: AtomicBool::new(true),
            transport: AsyncMutex::new(transport),
            polls: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Exclusive access to the transport, refused once the connection is closed.
    pub(crate) async fn transport(&self) -> Result<AsyncMutexGuard<'_, Box<dyn ModbusTransport>>> {
        let guard = self.transport.lock().await;
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        Ok(guard)
    }

    /// Poll table. Entries may only be added while the connection is open.
    pub(crate) fn polls(&self) -> &Mutex<BTreeMap<PollKey, PollEntry>> {
        &self.polls
    }

    /// Mark closed and cancel every poll timer.
    fn retire(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let cancelled = std::mem::take(&mut *self.polls.lock());
        if !cancelled.is_empty() {
            debug!(device = %self.key, count = cancelled.len(), "Cancelled poll timers");
        }
    }
}

/// Outcome of a connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// A connection under the same key already exists and was left untouched.
    AlreadyConnected,
}

/// Lifecycle guards, one per key with a connect or disconnect in progress.
#[derive(Default)]
struct KeyGuards {
    guards: Mutex<BTreeMap<ConnectionKey, Arc<AsyncMutex<()>>>>,
}

impl KeyGuards {
    async fn lock(&self, key: &ConnectionKey) -> KeyGuard<'_> {
        let guard = self.guards.lock().entry(key.clone()).or_default().clone();
        KeyGuard {
            owner: self,
            key: key.clone(),
            _held: guard.lock_owned().await,
        }
    }
}

struct KeyGuard<'a> {
    owner: &'a KeyGuards,
    key: ConnectionKey,
    _held: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut guards = self.owner.guards.lock();
        // Only the map and this guard's lock still reference the mutex: nobody is waiting.
        if guards
            .get(&self.key)
            .is_some_and(|m| Arc::strong_count(m) <= 2)
        {
            guards.remove(&self.key);
        }
    }
}

/// Owns all device connections.
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    connections: RwLock<BTreeMap<ConnectionKey, Arc<DeviceConnection>>>,
    lifecycle: KeyGuards,
    close_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            connections: RwLock::new(BTreeMap::new()),
            lifecycle: KeyGuards::default(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Bound the wait for an in-flight call when closing a connection.
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Open and register a connection unless one already exists for the key.
    pub async fn connect(&self, request: ConnectRequest) -> Result<ConnectOutcome> {
        let key = ConnectionKey::new(&request.address, request.unit_id);
        let _lifecycle = self.lifecycle.lock(&key).await;

        if self.connections.read().contains_key(&key) {
            debug!(device = %key, "Device already connected");
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        let transport = self.connector.open(&request).await.map_err(|e| {
            warn!(device = %key, kind = %request.kind, error = %e, "Connect failed");
            GatewayError::from(e)
        })?;

        info!(device = %key, kind = %request.kind, "Device connected");

        let connection = Arc::new(DeviceConnection::new(key.clone(), request.kind, transport));
        self.connections.write().insert(key, connection);

        Ok(ConnectOutcome::Connected)
    }

    /// Close and remove a connection.
    ///
    /// If the close fails, or an in-flight call does not release the transport
    /// within the close timeout, the entry stays registered and keeps its poll
    /// timers.
    pub async fn disconnect(&self, address: &str, unit_id: u8) -> Result<()> {
        let key = ConnectionKey::new(address, unit_id);
        let _lifecycle = self.lifecycle.lock(&key).await;

        let connection = self.connection(&key)?;
        let mut transport = tokio::time::timeout(self.close_timeout, connection.transport())
            .await
            .map_err(|_| {
                warn!(device = %key, "Transport busy, keeping connection");
                GatewayError::from(TransportError::RequestTimeout)
            })??;

        if let Err(e) = transport.close().await {
            warn!(device = %key, error = %e, "Close failed, keeping connection");
            return Err(e.into());
        }

        connection.retire();
        drop(transport);
        self.connections.write().remove(&key);

        info!(device = %key, "Device disconnected");
        Ok(())
    }

    /// Snapshot of registered connection keys.
    pub fn list(&self) -> Vec<ConnectionKey> {
        self.connections.read().keys().cloned().collect()
    }

    /// Look up a connection that is still open.
    pub fn connection(&self, key: &ConnectionKey) -> Result<Arc<DeviceConnection>> {
        self.connections
            .read()
            .get(key)
            .filter(|c| c.is_connected())
            .cloned()
            .ok_or(GatewayError::NotConnected)
    }

    pub(crate) fn connections(&self) -> Vec<Arc<DeviceConnection>> {
        self.connections.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Cancel all poll timers and close every connection.
    ///
    /// A connection whose transport stays busy past the close timeout is
    /// abandoned without a close.
    pub async fn shutdown(&self) {
        let drained = std::mem::take(&mut *self.connections.write());

        for (key, connection) in drained {
            connection.retire();

            let Ok(mut transport) =
                tokio::time::timeout(self.close_timeout, connection.transport.lock()).await
            else {
                warn!(device = %key, "Transport busy, abandoned during shutdown");
                continue;
            };

            if let Err(e) = transport.close().await {
                warn!(device = %key, error = %e, "Close failed during shutdown");
            }
        }

        info!("Connection registry shut down");
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.list())
            .finish()
    }
}
