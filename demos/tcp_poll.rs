//! Periodic TCP Poll Example
//!
//! Registers a fixed-rate poll against a Modbus TCP slave and prints the
//! decoded values as they arrive.
//!
//! # Running this example
//!
//! ```bash
//! cargo run --example tcp_poll
//! ```
//!
//! Note: this requires a Modbus TCP server on 127.0.0.1:502. Any Modbus
//! simulator works for testing.

use std::sync::Arc;
use std::time::Duration;

use relay_modbus::{
    EndpointKey, ModbusCallback, ModbusError, ModbusManager, ReadFunction, ReadPayload,
    ReadRequest, Task, TaskRequest, ValueType, WriteRequest, WriteSummary,
};

struct MeterSink;

impl ModbusCallback for MeterSink {
    fn on_read(&self, _request: &ReadRequest, payload: ReadPayload) {
        if let ReadPayload::Registers(regs) = payload {
            // Registers 0-1 hold a float32 measurement, big-endian words
            match regs.extract(0, ValueType::Float32) {
                Ok(value) => println!("measurement: {value}"),
                Err(e) => println!("decode failed: {e}"),
            }
        }
    }

    fn on_write(&self, _request: &WriteRequest, _summary: WriteSummary) {}

    fn on_error(&self, request: &TaskRequest, error: &ModbusError) {
        eprintln!("{request}: {error}");
    }
}

#[tokio::main]
async fn main() -> relay_modbus::ModbusResult<()> {
    let manager = ModbusManager::new();
    manager.activate()?;

    let callback: Arc<dyn ModbusCallback> = Arc::new(MeterSink);
    let task = Task::read(
        EndpointKey::tcp("127.0.0.1", 502),
        ReadRequest::new(1, ReadFunction::HoldingRegisters, 0, 2, 3)?,
        &callback,
    );

    manager.register_regular_poll(task.clone(), Duration::from_millis(500), Duration::ZERO)?;
    println!("polling, ctrl-c to stop");

    tokio::signal::ctrl_c().await.ok();

    manager.unregister_regular_poll(&task).await?;
    manager.deactivate().await;
    Ok(())
}
