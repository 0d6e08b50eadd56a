//! # Relay Modbus - Pooled Modbus Transport Manager
//!
//! An async Modbus transport and orchestration layer for industrial
//! integrations where many logical consumers share a small number of
//! physical links to Modbus slaves.
//!
//! ## What it does
//!
//! - **Connection pooling**: one connection slot per endpoint (TCP, UDP or
//!   serial), FIFO-fair borrowing, inter-transaction pacing
//! - **Scheduling**: one-off reads/writes and fixed-rate periodic polls with
//!   prompt cancellation
//! - **Retry/reconnect**: per-error-kind policy; slave exceptions retry on
//!   the live connection, everything else reconnects
//! - **Data extraction**: bit/register codec for the usual industrial types,
//!   including word-swapped layouts
//!
//! ## Supported Function Codes
//!
//! | Code | Function |
//! |------|----------|
//! | 0x01 | Read Coils |
//! | 0x02 | Read Discrete Inputs |
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x05 | Write Single Coil |
//! | 0x06 | Write Single Register |
//! | 0x0F | Write Multiple Coils |
//! | 0x10 | Write Multiple Registers |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use relay_modbus::{
//!     EndpointKey, ModbusCallback, ModbusError, ModbusManager, ReadFunction, ReadPayload,
//!     ReadRequest, Task, TaskRequest, WriteRequest, WriteSummary,
//! };
//!
//! struct PrintSink;
//!
//! impl ModbusCallback for PrintSink {
//!     fn on_read(&self, request: &ReadRequest, payload: ReadPayload) {
//!         println!("{request}: {payload:?}");
//!     }
//!     fn on_write(&self, request: &WriteRequest, summary: WriteSummary) {
//!         println!("{request}: acknowledged FC{:02}", summary.function_code);
//!     }
//!     fn on_error(&self, request: &TaskRequest, error: &ModbusError) {
//!         eprintln!("{request}: {error}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> relay_modbus::ModbusResult<()> {
//!     let manager = ModbusManager::new();
//!     manager.activate()?;
//!
//!     let callback: Arc<dyn ModbusCallback> = Arc::new(PrintSink);
//!     let task = Task::read(
//!         EndpointKey::tcp("127.0.0.1", 502),
//!         ReadRequest::new(1, ReadFunction::HoldingRegisters, 100, 2, 3)?,
//!         &callback,
//!     );
//!     manager.register_regular_poll(task, Duration::from_secs(1), Duration::ZERO)?;
//!
//!     tokio::time::sleep(Duration::from_secs(10)).await;
//!     manager.deactivate().await;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants based on official specification
pub mod constants;

/// Stack-allocated PDU and request builders
pub mod pdu;

/// MBAP/RTU/ASCII frame encapsulation
pub mod frame;

/// Typed values and the register codec
pub mod value;

/// Read/write request model and response payloads
pub mod request;

/// Endpoint identity and per-endpoint pool tuning
pub mod endpoint;

/// Network and serial transports
pub mod transport;

/// Keyed connection pool with per-endpoint serialisation
pub mod pool;

/// Tasks and consumer callbacks
pub mod task;

/// One-off submission and periodic poll scheduling
pub mod scheduler;

/// Manager facade owning pool and scheduler
pub mod manager;

/// JSON write blueprint adapter (optional)
#[cfg(feature = "json")]
pub mod writejson;

mod executor;

#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use endpoint::{
    DataBits, EndpointKey, EndpointPoolConfig, Parity, SerialEncoding, SerialParams, StopBits,
};
pub use error::{ErrorKind, ModbusError, ModbusResult, RetryAction};
pub use frame::{FrameCodec, Framing};
pub use manager::{ManagerConfig, ManagerListener, ModbusManager};
pub use pdu::Pdu;
pub use pool::{BorrowedConnection, ConnectionPool};
pub use request::{
    BitArray, ReadFunction, ReadPayload, ReadRequest, RegisterArray, WriteRequest, WriteSummary,
};
pub use scheduler::{
    CancelHandle, RegisteredPoll, DEFAULT_CALLBACK_WORKERS, DEFAULT_DISPATCH_WORKERS,
};
pub use task::{ModbusCallback, Task, TaskRequest};
pub use transport::{ModbusTransport, NetTransportFactory, TransportFactory};
pub use value::{command_to_bool, command_to_registers, extract_from_registers, Value, ValueType};

#[cfg(feature = "serial")]
pub use transport::SerialTransport;

#[cfg(feature = "json")]
pub use writejson::parse_write_requests;

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
