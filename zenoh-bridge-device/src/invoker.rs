//! One-shot method invocation against a registered connection.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::method::{MethodArgs, MethodOutput, ModbusMethod, WriteConfirmation};
use crate::registry::{ConnectionKey, ConnectionRegistry, DeviceConnection};
use crate::transport::ModbusTransport;

/// Validates and executes named operations.
#[derive(Debug, Clone)]
pub struct MethodInvoker {
    registry: Arc<ConnectionRegistry>,
}

impl MethodInvoker {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Run `method` at `offset` on the connection for `key`.
    ///
    /// The method name is checked before the connection, so an unsupported
    /// method is reported regardless of connection state.
    pub async fn invoke(
        &self,
        key: &ConnectionKey,
        method: &str,
        offset: u16,
        args: &MethodArgs,
    ) -> Result<MethodOutput> {
        let method: ModbusMethod = method.parse()?;
        let connection = self.registry.connection(key)?;
        invoke_on(&connection, method, offset, args).await
    }
}

/// Execute against a specific connection, holding its transport for the call.
pub(crate) async fn invoke_on(
    connection: &DeviceConnection,
    method: ModbusMethod,
    offset: u16,
    args: &MethodArgs,
) -> Result<MethodOutput> {
    let mut transport = connection.transport().await?;

    debug!(device = %connection.key(), %method, offset, "Invoking");

    execute(transport.as_mut(), method, offset, args)
        .await
        .inspect_err(|e| {
            warn!(device = %connection.key(), %method, offset, error = %e, "Invocation failed");
        })
}

async fn execute(
    transport: &mut dyn ModbusTransport,
    method: ModbusMethod,
    offset: u16,
    args: &MethodArgs,
) -> Result<MethodOutput> {
    let output = match method {
        ModbusMethod::ReadCoils => {
            let count = args.length_for(method)?;
            MethodOutput::Bits(transport.read_coils(offset, count).await?)
        }
        ModbusMethod::ReadDiscreteInputs => {
            let count = args.length_for(method)?;
            MethodOutput::Bits(transport.read_discrete_inputs(offset, count).await?)
        }
        ModbusMethod::ReadHoldingRegisters => {
            let count = args.length_for(method)?;
            MethodOutput::Registers(transport.read_holding_registers(offset, count).await?)
        }
        ModbusMethod::ReadInputRegisters => {
            let count = args.length_for(method)?;
            MethodOutput::Registers(transport.read_input_registers(offset, count).await?)
        }
        ModbusMethod::WriteCoil => {
            let state = args.coil_for(method)?;
            transport.write_single_coil(offset, state).await?;
            MethodOutput::Written(WriteConfirmation::Coil {
                address: offset,
                state,
            })
        }
        ModbusMethod::WriteRegister => {
            let value = args.register_for(method)?;
            transport.write_single_register(offset, value).await?;
            MethodOutput::Written(WriteConfirmation::Register {
                address: offset,
                value,
            })
        }
        ModbusMethod::WriteCoils => {
            let states = args.coils_for(method)?;
            let length = quantity(method, states.len())?;
            transport.write_multiple_coils(offset, &states).await?;
            MethodOutput::Written(WriteConfirmation::Multiple {
                address: offset,
                length,
            })
        }
        ModbusMethod::WriteRegisters => {
            let values = args.registers_for(method)?;
            let length = quantity(method, values.len())?;
            transport.write_multiple_registers(offset, &values).await?;
            MethodOutput::Written(WriteConfirmation::Multiple {
                address: offset,
                length,
            })
        }
    };

    Ok(output)
}

/// A write quantity must fit the 16-bit field of the request frame.
fn quantity(method: ModbusMethod, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        GatewayError::invalid_params(format!("{}: too many values ({})", method, len))
    })
}
