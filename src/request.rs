//! Read and write request model
//!
//! Requests are immutable value objects compared by content; the scheduler
//! relies on that equality to deduplicate poll registrations. Each request
//! knows how to build its PDU and how to decode or verify the matching
//! response.

use std::fmt;

use crate::constants::{MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_REGISTERS};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{
    build_read_request, build_write_multiple_coils, build_write_multiple_registers,
    build_write_single_coil, build_write_single_register, Pdu,
};
use crate::value::{extract_from_registers, Value, ValueType};

/// The four Modbus read functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadFunction {
    /// FC01
    Coils,
    /// FC02
    DiscreteInputs,
    /// FC03
    HoldingRegisters,
    /// FC04
    InputRegisters,
}

impl ReadFunction {
    /// Wire function code.
    #[inline]
    pub fn code(&self) -> u8 {
        match self {
            Self::Coils => 0x01,
            Self::DiscreteInputs => 0x02,
            Self::HoldingRegisters => 0x03,
            Self::InputRegisters => 0x04,
        }
    }

    /// Maximum element count for one request of this function.
    #[inline]
    pub fn max_length(&self) -> u16 {
        match self {
            Self::Coils | Self::DiscreteInputs => MAX_READ_COILS,
            Self::HoldingRegisters | Self::InputRegisters => MAX_READ_REGISTERS,
        }
    }

    /// True for the bit-oriented functions (FC01/FC02).
    #[inline]
    pub fn reads_bits(&self) -> bool {
        matches!(self, Self::Coils | Self::DiscreteInputs)
    }
}

impl fmt::Display for ReadFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Coils => "read coils",
            Self::DiscreteInputs => "read discrete inputs",
            Self::HoldingRegisters => "read holding registers",
            Self::InputRegisters => "read input registers",
        };
        write!(f, "{name} (FC{:02})", self.code())
    }
}

/// A single read: unit, function, start reference, element count, retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadRequest {
    unit_id: u8,
    function: ReadFunction,
    reference: u16,
    length: u16,
    max_tries: u32,
}

impl ReadRequest {
    /// Create a read request, validating the length against the function's
    /// protocol maximum and the retry budget against the minimum of one.
    pub fn new(
        unit_id: u8,
        function: ReadFunction,
        reference: u16,
        length: u16,
        max_tries: u32,
    ) -> ModbusResult<Self> {
        if length == 0 || length > function.max_length() {
            return Err(ModbusError::invalid_data(format!(
                "length {} outside [1, {}] for {}",
                length,
                function.max_length(),
                function
            )));
        }
        if max_tries == 0 {
            return Err(ModbusError::invalid_data("max_tries must be at least 1"));
        }
        Ok(Self {
            unit_id,
            function,
            reference,
            length,
            max_tries,
        })
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn function(&self) -> ReadFunction {
        self.function
    }

    pub fn reference(&self) -> u16 {
        self.reference
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Build the request PDU.
    pub fn to_pdu(&self) -> ModbusResult<Pdu> {
        build_read_request(self.function.code(), self.reference, self.length)
    }

    /// Decode a response PDU into the payload this request asked for.
    ///
    /// The returned payload is sized by the requested element count, never
    /// by the byte-padded count the wire carries.
    pub fn decode_response(&self, pdu: &Pdu) -> ModbusResult<ReadPayload> {
        pdu.check_exception()?;

        let data = pdu.as_slice();
        match data.first() {
            Some(&fc) if fc == self.function.code() => {}
            Some(&fc) => return Err(ModbusError::invalid_function(fc)),
            None => return Err(ModbusError::decode("empty response PDU")),
        }
        if data.len() < 2 {
            return Err(ModbusError::decode("response missing byte count"));
        }

        let byte_count = data[1] as usize;
        let payload = &data[2..];
        if payload.len() < byte_count {
            return Err(ModbusError::decode(format!(
                "response shorter than its byte count: {} < {}",
                payload.len(),
                byte_count
            )));
        }
        let payload = &payload[..byte_count];

        if self.function.reads_bits() {
            if byte_count < (self.length as usize).div_ceil(8) {
                return Err(ModbusError::decode(format!(
                    "bit response too short: {} byte(s) for {} bit(s)",
                    byte_count, self.length
                )));
            }
            Ok(ReadPayload::Bits(BitArray::from_wire(
                payload,
                self.length as usize,
            )))
        } else {
            if byte_count < self.length as usize * 2 {
                return Err(ModbusError::decode(format!(
                    "register response too short: {} byte(s) for {} register(s)",
                    byte_count, self.length
                )));
            }
            let registers = payload
                .chunks_exact(2)
                .take(self.length as usize)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Ok(ReadPayload::Registers(RegisterArray::new(registers)))
        }
    }
}

impl fmt::Display for ReadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} unit={} ref={} len={}",
            self.function, self.unit_id, self.reference, self.length
        )
    }
}

/// A single write: coil or registers, single or multiple form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WriteRequest {
    /// Single-bit write; FC05 or FC15 depending on `write_multiple`.
    Coil {
        unit_id: u8,
        reference: u16,
        value: bool,
        write_multiple: bool,
        max_tries: u32,
    },
    /// Register write; FC06 or FC16 depending on `write_multiple`.
    Registers {
        unit_id: u8,
        reference: u16,
        values: Vec<u16>,
        write_multiple: bool,
        max_tries: u32,
    },
}

impl WriteRequest {
    /// Create a coil write.
    pub fn coil(
        unit_id: u8,
        reference: u16,
        value: bool,
        write_multiple: bool,
        max_tries: u32,
    ) -> ModbusResult<Self> {
        if max_tries == 0 {
            return Err(ModbusError::invalid_data("max_tries must be at least 1"));
        }
        Ok(Self::Coil {
            unit_id,
            reference,
            value,
            write_multiple,
            max_tries,
        })
    }

    /// Create a register write. `values` must be non-empty; the single-write
    /// form (FC06) requires exactly one value.
    pub fn registers(
        unit_id: u8,
        reference: u16,
        values: Vec<u16>,
        write_multiple: bool,
        max_tries: u32,
    ) -> ModbusResult<Self> {
        if values.is_empty() {
            return Err(ModbusError::invalid_data("register write with no data"));
        }
        if !write_multiple && values.len() != 1 {
            return Err(ModbusError::invalid_data(
                "single register write requires exactly one value",
            ));
        }
        if values.len() > MAX_WRITE_REGISTERS as usize {
            return Err(ModbusError::invalid_data(format!(
                "register write of {} exceeds maximum {}",
                values.len(),
                MAX_WRITE_REGISTERS
            )));
        }
        if max_tries == 0 {
            return Err(ModbusError::invalid_data("max_tries must be at least 1"));
        }
        Ok(Self::Registers {
            unit_id,
            reference,
            values,
            write_multiple,
            max_tries,
        })
    }

    pub fn unit_id(&self) -> u8 {
        match self {
            Self::Coil { unit_id, .. } | Self::Registers { unit_id, .. } => *unit_id,
        }
    }

    pub fn reference(&self) -> u16 {
        match self {
            Self::Coil { reference, .. } | Self::Registers { reference, .. } => *reference,
        }
    }

    pub fn max_tries(&self) -> u32 {
        match self {
            Self::Coil { max_tries, .. } | Self::Registers { max_tries, .. } => *max_tries,
        }
    }

    /// Wire function code this request emits (5/6 single, 15/16 multiple).
    pub fn function_code(&self) -> u8 {
        match self {
            Self::Coil {
                write_multiple, ..
            } => {
                if *write_multiple {
                    0x0F
                } else {
                    0x05
                }
            }
            Self::Registers {
                write_multiple, ..
            } => {
                if *write_multiple {
                    0x10
                } else {
                    0x06
                }
            }
        }
    }

    /// Build the request PDU.
    pub fn to_pdu(&self) -> ModbusResult<Pdu> {
        match self {
            Self::Coil {
                reference,
                value,
                write_multiple,
                ..
            } => {
                if *write_multiple {
                    build_write_multiple_coils(*reference, &[*value])
                } else {
                    build_write_single_coil(*reference, *value)
                }
            }
            Self::Registers {
                reference,
                values,
                write_multiple,
                ..
            } => {
                if *write_multiple {
                    build_write_multiple_registers(*reference, values)
                } else {
                    build_write_single_register(*reference, values[0])
                }
            }
        }
    }

    /// Verify the acknowledgement PDU and summarise it.
    pub fn verify_response(&self, pdu: &Pdu) -> ModbusResult<WriteSummary> {
        pdu.check_exception()?;
        match pdu.function_code() {
            Some(fc) if fc == self.function_code() => Ok(WriteSummary { function_code: fc }),
            Some(fc) => Err(ModbusError::invalid_function(fc)),
            None => Err(ModbusError::decode("empty write acknowledgement")),
        }
    }
}

impl fmt::Display for WriteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coil {
                unit_id,
                reference,
                value,
                ..
            } => write!(
                f,
                "write coil (FC{:02}) unit={unit_id} ref={reference} value={value}",
                self.function_code()
            ),
            Self::Registers {
                unit_id,
                reference,
                values,
                ..
            } => write!(
                f,
                "write registers (FC{:02}) unit={unit_id} ref={reference} count={}",
                self.function_code(),
                values.len()
            ),
        }
    }
}

// ============================================================================
// Response payloads
// ============================================================================

/// Registers returned by FC03/FC04, sized by the requested count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterArray {
    registers: Vec<u16>,
}

impl RegisterArray {
    pub fn new(registers: Vec<u16>) -> Self {
        Self { registers }
    }

    /// Number of registers requested and returned.
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.registers
    }

    /// Register at `index`, bounds-checked.
    pub fn get(&self, index: usize) -> ModbusResult<u16> {
        self.registers.get(index).copied().ok_or_else(|| {
            ModbusError::decode(format!(
                "register index {index} out of bounds ({} available)",
                self.registers.len()
            ))
        })
    }

    /// Decode a typed value at `index` (in units of the value type).
    pub fn extract(&self, index: usize, value_type: ValueType) -> ModbusResult<Value> {
        extract_from_registers(&self.registers, index, value_type)
    }
}

/// Bits returned by FC01/FC02. Stores the wire bytes but exposes exactly the
/// requested element count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitArray {
    data: Vec<u8>,
    len: usize,
}

impl BitArray {
    /// Wrap wire bytes (LSB-first per byte) with the requested bit count.
    pub fn from_wire(data: &[u8], len: usize) -> Self {
        Self {
            data: data.to_vec(),
            len,
        }
    }

    /// Number of bits requested.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit at `index`, bounds-checked against the requested count.
    pub fn get(&self, index: usize) -> ModbusResult<bool> {
        if index >= self.len {
            return Err(ModbusError::decode(format!(
                "bit index {index} out of bounds ({} requested)",
                self.len
            )));
        }
        let byte = self.data.get(index / 8).copied().unwrap_or(0);
        Ok((byte >> (index % 8)) & 1 != 0)
    }

    /// All bits as booleans.
    pub fn to_vec(&self) -> Vec<bool> {
        (0..self.len)
            .map(|i| self.get(i).unwrap_or(false))
            .collect()
    }
}

/// Decoded read payload, shaped by the function code.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadPayload {
    Registers(RegisterArray),
    Bits(BitArray),
}

/// Acknowledgement of a completed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// Echoed function code.
    pub function_code: u8,
}
