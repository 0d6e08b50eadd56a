//! Single Coil Write Example
//!
//! Writes one coil ON (FC05, 0xFF00 on the wire) and waits for the
//! acknowledgement callback.
//!
//! # Running this example
//!
//! ```bash
//! cargo run --example write_coil
//! ```

use std::sync::Arc;
use std::time::Duration;

use relay_modbus::{
    EndpointKey, ModbusCallback, ModbusError, ModbusManager, ReadPayload, ReadRequest, Task,
    TaskRequest, WriteRequest, WriteSummary,
};

struct AckSink;

impl ModbusCallback for AckSink {
    fn on_read(&self, _: &ReadRequest, _: ReadPayload) {}

    fn on_write(&self, request: &WriteRequest, summary: WriteSummary) {
        println!("{request}: acknowledged with FC{:02}", summary.function_code);
    }

    fn on_error(&self, request: &TaskRequest, error: &ModbusError) {
        eprintln!("{request}: {error}");
    }
}

#[tokio::main]
async fn main() -> relay_modbus::ModbusResult<()> {
    let manager = ModbusManager::new();
    manager.activate()?;

    let callback: Arc<dyn ModbusCallback> = Arc::new(AckSink);
    let task = Task::write(
        EndpointKey::tcp("127.0.0.1", 502),
        WriteRequest::coil(1, 10, true, false, 3)?,
        &callback,
    );

    manager.submit_one_time_write(task)?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    manager.deactivate().await;
    Ok(())
}
