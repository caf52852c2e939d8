//! The `port` driver: local serial endpoint enumeration.

use std::sync::Arc;

use async_trait::async_trait;
use devgate_common::Params;
use serde::Serialize;
use serde_json::Value;
use tokio_serial::{SerialPortInfo, SerialPortType};

use super::Driver;
use crate::error::{GatewayError, Result};
use crate::transport::TransportError;

/// One local serial endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    pub path: String,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
    pub pnp_id: Option<String>,
    pub location_id: Option<String>,
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(port: SerialPortInfo) -> Self {
        let mut info = PortInfo {
            path: port.port_name,
            ..Default::default()
        };

        if let SerialPortType::UsbPort(usb) = port.port_type {
            info.manufacturer = usb.manufacturer;
            info.serial_number = usb.serial_number;
            info.vendor_id = Some(format!("{:04x}", usb.vid));
            info.product_id = Some(format!("{:04x}", usb.pid));
        }

        info
    }
}

/// Source of serial endpoint listings.
#[async_trait]
pub trait PortEnumerator: Send + Sync {
    async fn list(&self) -> Result<Vec<PortInfo>>;
}

/// Enumerates the ports of this host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

#[async_trait]
impl PortEnumerator for SystemPorts {
    async fn list(&self) -> Result<Vec<PortInfo>> {
        let ports = tokio::task::spawn_blocking(tokio_serial::available_ports)
            .await
            .map_err(|e| GatewayError::Driver(e.to_string()))?
            .map_err(|e| TransportError::Io(e.to_string()))?;

        Ok(ports.into_iter().map(PortInfo::from).collect())
    }
}

/// Serial port driver.
#[derive(Clone)]
pub struct PortDriver {
    enumerator: Arc<dyn PortEnumerator>,
}

impl PortDriver {
    pub fn new(enumerator: Arc<dyn PortEnumerator>) -> Self {
        Self { enumerator }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemPorts))
    }
}

#[async_trait]
impl Driver for PortDriver {
    fn name(&self) -> &'static str {
        "port"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["detect"]
    }

    async fn call(&self, _method: &str, _params: Params) -> Result<Value> {
        let ports = self.enumerator.list().await?;
        tracing::debug!(count = ports.len(), "Detected serial ports");
        serde_json::to_value(ports).map_err(|e| GatewayError::Driver(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_serial::UsbPortInfo;

    #[test]
    fn test_usb_port_info() {
        let info = PortInfo::from(SerialPortInfo {
            port_name: "/dev/ttyUSB0".to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x0403,
                pid: 0x6001,
                serial_number: Some("A50285BI".to_string()),
                manufacturer: Some("FTDI".to_string()),
                product: None,
            }),
        });

        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            serde_json::json!({
                "path": "/dev/ttyUSB0",
                "manufacturer": "FTDI",
                "serialNumber": "A50285BI",
                "pnpId": null,
                "locationId": null,
                "vendorId": "0403",
                "productId": "6001"
            })
        );
    }

    #[test]
    fn test_plain_port_info() {
        let info = PortInfo::from(SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: SerialPortType::Unknown,
        });
        assert_eq!(info.path, "/dev/ttyS0");
        assert!(info.vendor_id.is_none());
    }

    struct FixedPorts(Vec<PortInfo>);

    #[async_trait]
    impl PortEnumerator for FixedPorts {
        async fn list(&self) -> Result<Vec<PortInfo>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_detect() {
        let driver = PortDriver::new(Arc::new(FixedPorts(vec![PortInfo {
            path: "COM3".to_string(),
            ..Default::default()
        }])));

        let result = driver
            .call("detect", Params::Positional(Vec::new()))
            .await
            .unwrap();
        assert_eq!(result[0]["path"], "COM3");
    }
}
