//! Named drivers reachable through the command dispatcher.

mod modbus;
mod port;

pub use modbus::{ConnectParams, IntervalParams, MethodParams, ModbusDriver};
pub use port::{PortDriver, PortEnumerator, PortInfo, SystemPorts};

use async_trait::async_trait;
use devgate_common::Params;
use serde_json::Value;

use crate::error::Result;

/// A named set of operations.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Name commands address this driver by.
    fn name(&self) -> &'static str;

    /// Operations accepted by [`call`](Self::call).
    fn methods(&self) -> &'static [&'static str];

    /// Run one operation. `method` is always one of [`methods`](Self::methods).
    async fn call(&self, method: &str, params: Params) -> Result<Value>;
}
