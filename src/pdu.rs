//! Stack-allocated Modbus PDU
//!
//! A PDU is at most 253 bytes, so a fixed array avoids heap allocation on
//! the request path. Request builders for the eight supported function codes
//! live here; framing (MBAP/RTU/ASCII) is layered on top in [`crate::frame`].

use tracing::trace;

use crate::constants::{
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, MAX_PDU_SIZE, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};
use crate::error::{ModbusError, ModbusResult};

/// Fixed-capacity protocol data unit: function code plus payload.
#[derive(Debug, Clone)]
pub struct Pdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl Pdu {
    /// Create an empty PDU.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from received bytes.
    pub fn from_slice(data: &[u8]) -> ModbusResult<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::decode(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }

        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();

        trace!("PDU from wire: {:02X?}", pdu.as_slice());
        Ok(pdu)
    }

    /// Append a single byte.
    #[inline]
    pub fn push(&mut self, byte: u8) -> ModbusResult<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(ModbusError::decode("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Append a u16 in big-endian.
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> ModbusResult<()> {
        self.push((value >> 8) as u8)?;
        self.push((value & 0xFF) as u8)
    }

    /// Append a byte slice.
    pub fn extend(&mut self, bytes: &[u8]) -> ModbusResult<()> {
        if self.len + bytes.len() > MAX_PDU_SIZE {
            return Err(ModbusError::decode(format!(
                "PDU would exceed max size: {} + {} > {}",
                self.len,
                bytes.len(),
                MAX_PDU_SIZE
            )));
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// View the PDU bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Current length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no bytes have been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Function code (first byte), if present.
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    /// True when the high bit of the function code marks an exception.
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code().is_some_and(|fc| fc & 0x80 != 0)
    }

    /// Exception code (second byte of an exception PDU).
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() && self.len > 1 {
            Some(self.data[1])
        } else {
            None
        }
    }

    /// Turn an exception PDU into the corresponding error.
    ///
    /// Returns `Ok(())` when this PDU is not an exception.
    pub fn check_exception(&self) -> ModbusResult<()> {
        if let Some(code) = self.exception_code() {
            return Err(ModbusError::Exception {
                function: self.function_code().unwrap_or(0) & 0x7F,
                code,
            });
        }
        if self.is_exception() {
            return Err(ModbusError::decode("truncated exception PDU"));
        }
        Ok(())
    }
}

impl Default for Pdu {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Request builders
// ============================================================================

/// Build a read request PDU for FC01-FC04.
pub fn build_read_request(fc: u8, reference: u16, quantity: u16) -> ModbusResult<Pdu> {
    if !matches!(fc, 0x01..=0x04) {
        return Err(ModbusError::invalid_function(fc));
    }
    let mut pdu = Pdu::new();
    pdu.push(fc)?;
    pdu.push_u16(reference)?;
    pdu.push_u16(quantity)?;
    Ok(pdu)
}

/// Build a write-single-coil PDU (FC05). ON is 0xFF00, OFF is 0x0000.
pub fn build_write_single_coil(reference: u16, value: bool) -> ModbusResult<Pdu> {
    let mut pdu = Pdu::new();
    pdu.push(FC_WRITE_SINGLE_COIL)?;
    pdu.push_u16(reference)?;
    pdu.push_u16(if value { 0xFF00 } else { 0x0000 })?;
    Ok(pdu)
}

/// Build a write-single-register PDU (FC06).
pub fn build_write_single_register(reference: u16, value: u16) -> ModbusResult<Pdu> {
    let mut pdu = Pdu::new();
    pdu.push(FC_WRITE_SINGLE_REGISTER)?;
    pdu.push_u16(reference)?;
    pdu.push_u16(value)?;
    Ok(pdu)
}

/// Build a write-multiple-coils PDU (FC15). Bits pack LSB-first per byte.
pub fn build_write_multiple_coils(reference: u16, values: &[bool]) -> ModbusResult<Pdu> {
    if values.is_empty() || values.len() > MAX_WRITE_COILS as usize {
        return Err(ModbusError::invalid_data(format!(
            "invalid coil count for FC15: {}",
            values.len()
        )));
    }

    let mut pdu = Pdu::new();
    pdu.push(FC_WRITE_MULTIPLE_COILS)?;
    pdu.push_u16(reference)?;
    pdu.push_u16(values.len() as u16)?;
    pdu.push(values.len().div_ceil(8) as u8)?;

    for chunk in values.chunks(8) {
        let mut byte = 0u8;
        for (i, &bit) in chunk.iter().enumerate() {
            if bit {
                byte |= 1 << i;
            }
        }
        pdu.push(byte)?;
    }

    Ok(pdu)
}

/// Build a write-multiple-registers PDU (FC16). Registers pack big-endian.
pub fn build_write_multiple_registers(reference: u16, values: &[u16]) -> ModbusResult<Pdu> {
    if values.is_empty() || values.len() > MAX_WRITE_REGISTERS as usize {
        return Err(ModbusError::invalid_data(format!(
            "invalid register count for FC16: {}",
            values.len()
        )));
    }

    let mut pdu = Pdu::new();
    pdu.push(FC_WRITE_MULTIPLE_REGISTERS)?;
    pdu.push_u16(reference)?;
    pdu.push_u16(values.len() as u16)?;
    pdu.push((values.len() * 2) as u8)?;
    for &value in values {
        pdu.push_u16(value)?;
    }

    Ok(pdu)
}
