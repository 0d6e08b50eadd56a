//! Relay Modbus Demo
//!
//! Demonstrates the relay_modbus library:
//! - Value codec (extract/encode, word-swapped layouts)
//! - One-off reads and writes through the manager
//! - A periodic poll with live callbacks
//!
//! Usage: cargo run --bin demo [host:port]
//! Example: cargo run --bin demo 127.0.0.1:502

use std::sync::Arc;
use std::time::Duration;

use relay_modbus::{
    command_to_registers, extract_from_registers, EndpointKey, ModbusCallback, ModbusError,
    ModbusManager, ReadFunction, ReadPayload, ReadRequest, Task, TaskRequest, Value, ValueType,
    WriteRequest, WriteSummary,
};

struct PrintSink;

impl ModbusCallback for PrintSink {
    fn on_read(&self, request: &ReadRequest, payload: ReadPayload) {
        match payload {
            ReadPayload::Registers(regs) => {
                println!("  {request} -> {:04X?}", regs.as_slice());
            }
            ReadPayload::Bits(bits) => {
                println!("  {request} -> {:?}", bits.to_vec());
            }
        }
    }

    fn on_write(&self, request: &WriteRequest, summary: WriteSummary) {
        println!("  {request} -> acknowledged FC{:02}", summary.function_code);
    }

    fn on_error(&self, request: &TaskRequest, error: &ModbusError) {
        println!("  {request} -> ERROR: {error}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:502".to_string());
    let (host, port) = address
        .rsplit_once(':')
        .ok_or("address must be host:port")?;
    let port: u16 = port.parse()?;

    println!("Relay Modbus Demo");
    println!("=================\n");

    // =========================================================================
    // Part 1: Value codec (no connection required)
    // =========================================================================
    println!("Part 1: Value codec");
    println!("-------------------");

    let registers = [0x1234u16, 0x5678];
    for ty in [ValueType::Uint16, ValueType::Int32, ValueType::Int32Swap] {
        let value = extract_from_registers(&registers, 0, ty)?;
        println!("  [1234 5678] as {ty}: {value}");
    }

    let encoded = command_to_registers(Value::F32(50.0), ValueType::Float32)?;
    println!("  50.0f32 encodes to {:04X?}", encoded);

    // =========================================================================
    // Part 2: Manager-driven transactions
    // =========================================================================
    println!("\nPart 2: Transactions against {address}");
    println!("--------------------------------------");

    let manager = ModbusManager::new();
    manager.activate()?;

    let callback: Arc<dyn ModbusCallback> = Arc::new(PrintSink);
    let endpoint = EndpointKey::tcp(host, port);

    // One-off read of ten holding registers
    manager.submit_one_time_read(Task::read(
        endpoint.clone(),
        ReadRequest::new(1, ReadFunction::HoldingRegisters, 0, 10, 3)?,
        &callback,
    ))?;

    // One-off coil write
    manager.submit_one_time_write(Task::write(
        endpoint.clone(),
        WriteRequest::coil(1, 0, true, false, 3)?,
        &callback,
    ))?;

    // Periodic poll for five seconds
    let poll = Task::read(
        endpoint,
        ReadRequest::new(1, ReadFunction::InputRegisters, 0, 4, 3)?,
        &callback,
    );
    manager.register_regular_poll(poll.clone(), Duration::from_secs(1), Duration::ZERO)?;
    println!("  polling input registers every second...");

    tokio::time::sleep(Duration::from_secs(5)).await;

    manager.unregister_regular_poll(&poll).await?;
    manager.deactivate().await;
    println!("\nDone.");
    Ok(())
}
