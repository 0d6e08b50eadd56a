//! Modbus protocol constants based on official specification
//!
//! Frame sizes descend from the RS485 ADU limit of 256 bytes; register and
//! coil limits are derived so a maximal request or response still fits in
//! one PDU.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// MBAP header length for TCP/UDP framing.
/// Transaction ID(2) + Protocol ID(2) + Length(2) = 6 bytes before the unit ID.
pub const MBAP_HEADER_LEN: usize = 6;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification.
/// RS485 ADU (256) - slave address (1) - CRC (2) = 253 bytes.
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value: unit ID (1) + max PDU (253).
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Receive buffer size for a single Modbus frame.
/// Largest binary frame is 260 bytes (MBAP); ASCII doubles the payload and
/// adds framing characters, so 520 covers every mode.
pub const FRAME_BUFFER_SIZE: usize = 520;

/// ASCII framing start character.
pub const ASCII_START: u8 = b':';

/// ASCII framing trailer.
pub const ASCII_TRAILER: [u8; 2] = [b'\r', b'\n'];

// ============================================================================
// Operation Limits
// ============================================================================

/// Maximum registers per FC03/FC04 read.
/// Response PDU: FC (1) + byte count (1) + N*2 <= 253, so N <= 125.
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum registers per FC16 write.
/// Request PDU: FC (1) + address (2) + quantity (2) + byte count (1) + N*2 <= 253, so N <= 123.
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Maximum coils per FC01/FC02 read (spec value, below the PDU-derived 2008).
pub const MAX_READ_COILS: u16 = 2000;

/// Maximum coils per FC15 write (spec value 0x7B0).
pub const MAX_WRITE_COILS: u16 = 1968;

// ============================================================================
// Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

// ============================================================================
// Pool Defaults
// ============================================================================

/// Default minimum gap between transactions on a TCP or UDP endpoint (ms).
pub const DEFAULT_TCP_INTER_TRANSACTION_DELAY_MS: u64 = 60;

/// Default minimum gap between transactions on a serial endpoint (ms).
pub const DEFAULT_SERIAL_INTER_TRANSACTION_DELAY_MS: u64 = 35;

/// Default bound for a single connect attempt (ms).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default bound for a single response read (ms).
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 3_000;

/// Default number of connect attempts per borrow.
pub const DEFAULT_CONNECT_MAX_TRIES: u32 = 1;
