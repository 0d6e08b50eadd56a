//! Frame encapsulation for the three wire encodings
//!
//! The application layer (PDU) is identical everywhere; transports differ
//! only in how they wrap it:
//!
//! - **MBAP** (TCP/UDP): transaction ID + protocol ID + length + unit ID.
//! - **RTU** (serial): unit ID + PDU + CRC-16/MODBUS, little-endian trailer.
//! - **ASCII** (serial): `:` + hex(unit ID + PDU + LRC) + CR LF.
//!
//! MBAP responses are matched to their request by transaction ID; a mismatch
//! is reported as its own error kind so the executor can invalidate the
//! connection.

use bytes::{BufMut, BytesMut};
use crc::{Crc, CRC_16_MODBUS};
use tracing::trace;

use crate::constants::{ASCII_START, ASCII_TRAILER, MAX_MBAP_LENGTH, MBAP_HEADER_LEN};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::Pdu;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Wire encoding of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// MBAP header, used by TCP and UDP.
    Mbap,
    /// Binary serial framing with CRC.
    Rtu,
    /// 7-bit-safe serial framing with LRC.
    Ascii,
}

impl Framing {
    /// True when responses carry a transaction ID to validate.
    #[inline]
    pub fn is_framed(&self) -> bool {
        matches!(self, Self::Mbap)
    }
}

/// Stateful frame codec: owns the per-connection transaction ID counter.
#[derive(Debug)]
pub struct FrameCodec {
    framing: Framing,
    next_transaction_id: u16,
}

/// An encoded request frame plus the transaction ID it was assigned
/// (headless transports carry none).
#[derive(Debug)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub transaction_id: Option<u16>,
}

impl FrameCodec {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            next_transaction_id: 1,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Wraps naturally from 0xFFFF to 0x0000.
    fn take_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    /// Wrap a request PDU in this connection's framing.
    pub fn encode(&mut self, unit_id: u8, pdu: &Pdu) -> EncodedFrame {
        let frame = match self.framing {
            Framing::Mbap => {
                let transaction_id = self.take_transaction_id();
                EncodedFrame {
                    bytes: encode_mbap(transaction_id, unit_id, pdu),
                    transaction_id: Some(transaction_id),
                }
            }
            Framing::Rtu => EncodedFrame {
                bytes: encode_rtu(unit_id, pdu),
                transaction_id: None,
            },
            Framing::Ascii => EncodedFrame {
                bytes: encode_ascii(unit_id, pdu),
                transaction_id: None,
            },
        };
        trace!("TX {:?} frame: {:02X?}", self.framing, frame.bytes);
        frame
    }

    /// Unwrap a response frame, validating framing and (for MBAP) the
    /// transaction ID against the request's.
    pub fn decode(
        &self,
        data: &[u8],
        expected_transaction_id: Option<u16>,
    ) -> ModbusResult<(u8, Pdu)> {
        trace!("RX {:?} frame: {:02X?}", self.framing, data);
        match self.framing {
            Framing::Mbap => decode_mbap(data, expected_transaction_id),
            Framing::Rtu => decode_rtu(data),
            Framing::Ascii => decode_ascii(data),
        }
    }
}

// ============================================================================
// MBAP
// ============================================================================

/// Build an MBAP frame: header + unit ID + PDU.
pub fn encode_mbap(transaction_id: u16, unit_id: u8, pdu: &Pdu) -> Vec<u8> {
    let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + 1 + pdu.len());
    frame.put_u16(transaction_id);
    frame.put_u16(0); // protocol ID
    frame.put_u16((pdu.len() + 1) as u16);
    frame.put_u8(unit_id);
    frame.put_slice(pdu.as_slice());
    frame.to_vec()
}

/// Parse an MBAP frame, returning unit ID and PDU.
pub fn decode_mbap(data: &[u8], expected_transaction_id: Option<u16>) -> ModbusResult<(u8, Pdu)> {
    if data.len() < MBAP_HEADER_LEN + 2 {
        return Err(ModbusError::decode(format!(
            "MBAP frame too short: {} byte(s)",
            data.len()
        )));
    }

    let transaction_id = u16::from_be_bytes([data[0], data[1]]);
    let protocol_id = u16::from_be_bytes([data[2], data[3]]);
    let length = u16::from_be_bytes([data[4], data[5]]) as usize;
    let unit_id = data[6];

    if protocol_id != 0 {
        return Err(ModbusError::decode(format!(
            "invalid MBAP protocol ID: {protocol_id}"
        )));
    }
    if length < 2 || length > MAX_MBAP_LENGTH {
        return Err(ModbusError::decode(format!(
            "invalid MBAP length field: {length}"
        )));
    }
    if data.len() != MBAP_HEADER_LEN + length {
        return Err(ModbusError::decode(format!(
            "MBAP length mismatch: header says {}, frame has {}",
            length,
            data.len() - MBAP_HEADER_LEN
        )));
    }

    if let Some(expected) = expected_transaction_id {
        if transaction_id != expected {
            return Err(ModbusError::TransactionId {
                expected,
                actual: transaction_id,
            });
        }
    }

    let pdu = Pdu::from_slice(&data[MBAP_HEADER_LEN + 1..])?;
    Ok((unit_id, pdu))
}

/// Total frame length announced by an MBAP header, once 6 bytes are available.
pub fn mbap_frame_len(header: &[u8]) -> ModbusResult<usize> {
    if header.len() < MBAP_HEADER_LEN {
        return Err(ModbusError::decode("incomplete MBAP header"));
    }
    let length = u16::from_be_bytes([header[4], header[5]]) as usize;
    if length < 2 || length > MAX_MBAP_LENGTH {
        return Err(ModbusError::decode(format!(
            "invalid MBAP length field: {length}"
        )));
    }
    Ok(MBAP_HEADER_LEN + length)
}

// ============================================================================
// RTU
// ============================================================================

/// Build an RTU frame: unit ID + PDU + CRC (little-endian trailer).
pub fn encode_rtu(unit_id: u8, pdu: &Pdu) -> Vec<u8> {
    let mut frame = BytesMut::with_capacity(1 + pdu.len() + 2);
    frame.put_u8(unit_id);
    frame.put_slice(pdu.as_slice());
    let crc = CRC16.checksum(&frame);
    frame.put_u16_le(crc);
    frame.to_vec()
}

/// Parse an RTU frame, validating the CRC.
pub fn decode_rtu(data: &[u8]) -> ModbusResult<(u8, Pdu)> {
    if data.len() < 4 {
        return Err(ModbusError::decode(format!(
            "RTU frame too short: {} byte(s)",
            data.len()
        )));
    }

    let crc_offset = data.len() - 2;
    let received = u16::from_le_bytes([data[crc_offset], data[crc_offset + 1]]);
    let computed = CRC16.checksum(&data[..crc_offset]);
    if received != computed {
        return Err(ModbusError::decode(format!(
            "RTU CRC mismatch: expected {computed:04X}, got {received:04X}"
        )));
    }

    let pdu = Pdu::from_slice(&data[1..crc_offset])?;
    Ok((data[0], pdu))
}

/// Expected total length of an RTU response, once enough of it has arrived
/// to tell. Returns `None` while more bytes are needed.
pub fn rtu_frame_len(data: &[u8]) -> ModbusResult<Option<usize>> {
    if data.len() < 2 {
        return Ok(None);
    }
    let fc = data[1];
    if fc & 0x80 != 0 {
        // unit + fc + exception code + crc
        return Ok(Some(5));
    }
    match fc {
        0x01..=0x04 => {
            if data.len() < 3 {
                return Ok(None);
            }
            // unit + fc + byte count + data + crc
            Ok(Some(3 + data[2] as usize + 2))
        }
        0x05 | 0x06 | 0x0F | 0x10 => Ok(Some(8)),
        other => Err(ModbusError::invalid_function(other)),
    }
}

// ============================================================================
// ASCII
// ============================================================================

/// LRC: two's complement of the byte sum.
fn lrc(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    sum.wrapping_neg()
}

/// Build an ASCII frame: `:` + hex(unit + PDU + LRC) + CR LF.
pub fn encode_ascii(unit_id: u8, pdu: &Pdu) -> Vec<u8> {
    let mut raw = Vec::with_capacity(1 + pdu.len());
    raw.push(unit_id);
    raw.extend_from_slice(pdu.as_slice());
    let lrc = lrc(&raw);

    let mut frame = BytesMut::with_capacity(1 + 2 * (raw.len() + 1) + 2);
    frame.put_u8(ASCII_START);
    for byte in raw.iter().chain(std::iter::once(&lrc)) {
        frame.put_slice(format!("{byte:02X}").as_bytes());
    }
    frame.put_slice(&ASCII_TRAILER);
    frame.to_vec()
}

/// Parse an ASCII frame, validating framing characters and the LRC.
pub fn decode_ascii(data: &[u8]) -> ModbusResult<(u8, Pdu)> {
    if data.len() < 1 + 4 + 2 || data[0] != ASCII_START || !data.ends_with(&ASCII_TRAILER) {
        return Err(ModbusError::decode("malformed ASCII frame"));
    }

    let hex = &data[1..data.len() - 2];
    if hex.len() % 2 != 0 {
        return Err(ModbusError::decode("odd ASCII hex payload"));
    }

    let mut raw = Vec::with_capacity(hex.len() / 2);
    for pair in hex.chunks_exact(2) {
        let text = std::str::from_utf8(pair)
            .map_err(|_| ModbusError::decode("non-UTF8 ASCII payload"))?;
        let byte = u8::from_str_radix(text, 16)
            .map_err(|_| ModbusError::decode(format!("bad ASCII hex pair: {text:?}")))?;
        raw.push(byte);
    }

    let received = raw.pop().ok_or_else(|| ModbusError::decode("empty ASCII frame"))?;
    let computed = lrc(&raw);
    if received != computed {
        return Err(ModbusError::decode(format!(
            "ASCII LRC mismatch: expected {computed:02X}, got {received:02X}"
        )));
    }
    if raw.is_empty() {
        return Err(ModbusError::decode("ASCII frame without unit ID"));
    }

    let pdu = Pdu::from_slice(&raw[1..])?;
    Ok((raw[0], pdu))
}
