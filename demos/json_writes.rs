//! JSON Write Blueprint Example
//!
//! Decodes a JSON write blueprint into write requests and submits them.
//!
//! # Running this example
//!
//! ```bash
//! cargo run --example json_writes --features json
//! ```

use std::sync::Arc;
use std::time::Duration;

use relay_modbus::{
    parse_write_requests, EndpointKey, ModbusCallback, ModbusError, ModbusManager, ReadPayload,
    ReadRequest, Task, TaskRequest, WriteRequest, WriteSummary,
};

struct AckSink;

impl ModbusCallback for AckSink {
    fn on_read(&self, _: &ReadRequest, _: ReadPayload) {}
    fn on_write(&self, request: &WriteRequest, _: WriteSummary) {
        println!("done: {request}");
    }
    fn on_error(&self, request: &TaskRequest, error: &ModbusError) {
        eprintln!("{request}: {error}");
    }
}

#[tokio::main]
async fn main() -> relay_modbus::ModbusResult<()> {
    let blueprint = r#"[
        { "functionCode": 6,  "address": 100, "value": 42 },
        { "functionCode": 16, "address": 200, "value": [1, 2, 3], "maxTries": 2 },
        { "functionCode": 5,  "address": 10,  "value": 1 }
    ]"#;

    let manager = ModbusManager::new();
    manager.activate()?;

    let callback: Arc<dyn ModbusCallback> = Arc::new(AckSink);
    let endpoint = EndpointKey::tcp("127.0.0.1", 502);

    for request in parse_write_requests(1, blueprint)? {
        manager.submit_one_time_write(Task::write(endpoint.clone(), request, &callback))?;
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    manager.deactivate().await;
    Ok(())
}
