//! Typed values and the register codec
//!
//! Pure translation between raw register frames and typed scalar values.
//! Wire byte order within a register is big-endian; the `*Swap` variants
//! reverse register order within a multi-register value (the CDAB layout
//! common in Modbus devices).
//!
//! | Type | Registers | Sub-elements per register |
//! |------|-----------|---------------------------|
//! | Bit | 1/16 | 16 |
//! | Int8/Uint8 | 1/2 | 2 |
//! | Int16/Uint16 | 1 | - |
//! | Int32/Uint32/Float32 (+Swap) | 2 | - |
//! | Int64/Uint64/Float64 (+Swap) | 4 | - |

use std::fmt;

use crate::error::{ModbusError, ModbusResult};

/// Data type of a value stored in registers or coils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Single bit, 16 per register.
    Bit,
    /// Signed 8-bit, two per register.
    Int8,
    /// Unsigned 8-bit, two per register.
    Uint8,
    /// Signed 16-bit, one register.
    Int16,
    /// Unsigned 16-bit, one register.
    Uint16,
    /// Signed 32-bit, two registers.
    Int32,
    /// Unsigned 32-bit, two registers.
    Uint32,
    /// Signed 64-bit, four registers.
    Int64,
    /// Unsigned 64-bit, four registers.
    Uint64,
    /// IEEE 754 single, two registers.
    Float32,
    /// IEEE 754 double, four registers.
    Float64,
    /// Int32 with the register pair reversed.
    Int32Swap,
    /// Uint32 with the register pair reversed.
    Uint32Swap,
    /// Int64 with register order reversed.
    Int64Swap,
    /// Uint64 with register order reversed.
    Uint64Swap,
    /// Float32 with the register pair reversed.
    Float32Swap,
    /// Float64 with register order reversed.
    Float64Swap,
}

impl ValueType {
    /// Width of one element in bits.
    #[inline]
    pub fn bits(&self) -> u32 {
        match self {
            Self::Bit => 1,
            Self::Int8 | Self::Uint8 => 8,
            Self::Int16 | Self::Uint16 => 16,
            Self::Int32 | Self::Uint32 | Self::Float32 | Self::Int32Swap | Self::Uint32Swap
            | Self::Float32Swap => 32,
            Self::Int64 | Self::Uint64 | Self::Float64 | Self::Int64Swap | Self::Uint64Swap
            | Self::Float64Swap => 64,
        }
    }

    /// Number of whole registers one element occupies (0 for sub-register types).
    #[inline]
    pub fn register_count(&self) -> usize {
        (self.bits() / 16) as usize
    }

    /// True for the word-swapped variants.
    #[inline]
    pub fn has_word_swap(&self) -> bool {
        matches!(
            self,
            Self::Int32Swap
                | Self::Uint32Swap
                | Self::Int64Swap
                | Self::Uint64Swap
                | Self::Float32Swap
                | Self::Float64Swap
        )
    }

    /// Descriptive name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bit => "bit",
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int32Swap => "int32_swap",
            Self::Uint32Swap => "uint32_swap",
            Self::Int64Swap => "int64_swap",
            Self::Uint64Swap => "uint64_swap",
            Self::Float32Swap => "float32_swap",
            Self::Float64Swap => "float64_swap",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decoded scalar value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// Uniform numeric view; booleans become 1.0/0.0.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Bool(b) => u8::from(*b) as f64,
            Self::I8(v) => f64::from(*v),
            Self::U8(v) => f64::from(*v),
            Self::I16(v) => f64::from(*v),
            Self::U16(v) => f64::from(*v),
            Self::I32(v) => f64::from(*v),
            Self::U32(v) => f64::from(*v),
            Self::I64(v) => *v as f64,
            Self::U64(v) => *v as f64,
            Self::F32(v) => f64::from(*v),
            Self::F64(v) => *v,
        }
    }

    /// Integer view; floats round to nearest.
    #[inline]
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Bool(b) => i64::from(*b),
            Self::I8(v) => i64::from(*v),
            Self::U8(v) => i64::from(*v),
            Self::I16(v) => i64::from(*v),
            Self::U16(v) => i64::from(*v),
            Self::I32(v) => i64::from(*v),
            Self::U32(v) => i64::from(*v),
            Self::I64(v) => *v,
            Self::U64(v) => *v as i64,
            Self::F32(v) => v.round() as i64,
            Self::F64(v) => v.round() as i64,
        }
    }

    /// True when the value is zero or false.
    #[inline]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Bool(b) => !*b,
            Self::F32(v) => *v == 0.0,
            Self::F64(v) => *v == 0.0,
            _ => self.as_i64() == 0,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Extract one element of `value_type` from a register frame.
///
/// `index` counts in units of the value type, not in registers: for 32-bit
/// types index 1 starts at the third register, while for 8-bit types index 1
/// is the second byte of the first register. Sub-register elements count
/// from the least significant position, matching the 1/0 encoding of
/// [`command_to_registers`].
pub fn extract_from_registers(
    registers: &[u16],
    index: usize,
    value_type: ValueType,
) -> ModbusResult<Value> {
    let bits = value_type.bits();

    if bits < 16 {
        let per_register = (16 / bits) as usize;
        let register_index = index / per_register;
        let sub = (index % per_register) as u32;
        let register = *registers.get(register_index).ok_or_else(|| {
            out_of_bounds(registers.len(), index, value_type)
        })?;

        return Ok(match value_type {
            ValueType::Bit => Value::Bool((register >> sub) & 1 != 0),
            ValueType::Uint8 => Value::U8((register >> (8 * sub)) as u8),
            ValueType::Int8 => Value::I8((register >> (8 * sub)) as u8 as i8),
            _ => unreachable!("no other sub-register types"),
        });
    }

    let count = value_type.register_count();
    let first = index * count;
    if first + count > registers.len() {
        return Err(out_of_bounds(registers.len(), index, value_type));
    }

    let mut words: Vec<u16> = registers[first..first + count].to_vec();
    if value_type.has_word_swap() {
        words.reverse();
    }

    let mut bytes = [0u8; 8];
    for (i, word) in words.iter().enumerate() {
        bytes[2 * i..2 * i + 2].copy_from_slice(&word.to_be_bytes());
    }

    Ok(match value_type {
        ValueType::Int16 => Value::I16(words[0] as i16),
        ValueType::Uint16 => Value::U16(words[0]),
        ValueType::Int32 | ValueType::Int32Swap => {
            Value::I32(i32::from_be_bytes(bytes[..4].try_into().unwrap()))
        }
        ValueType::Uint32 | ValueType::Uint32Swap => {
            Value::U32(u32::from_be_bytes(bytes[..4].try_into().unwrap()))
        }
        ValueType::Float32 | ValueType::Float32Swap => {
            Value::F32(f32::from_be_bytes(bytes[..4].try_into().unwrap()))
        }
        ValueType::Int64 | ValueType::Int64Swap => Value::I64(i64::from_be_bytes(bytes)),
        ValueType::Uint64 | ValueType::Uint64Swap => Value::U64(u64::from_be_bytes(bytes)),
        ValueType::Float64 | ValueType::Float64Swap => Value::F64(f64::from_be_bytes(bytes)),
        _ => unreachable!("sub-register types handled above"),
    })
}

fn out_of_bounds(available: usize, index: usize, value_type: ValueType) -> ModbusError {
    ModbusError::decode(format!(
        "index {index} of type {value_type} out of bounds for {available} register(s)"
    ))
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a value as registers of the given type, width-preserving.
///
/// Booleans map to 1/0 in a single register when the type is [`ValueType::Bit`].
/// Sub-register integer types occupy the least significant byte of one
/// register. Numeric conversions truncate toward the target width.
pub fn command_to_registers(value: Value, value_type: ValueType) -> ModbusResult<Vec<u16>> {
    let registers = match value_type {
        ValueType::Bit => vec![u16::from(!value.is_zero())],
        ValueType::Int8 => vec![(value.as_i64() as i8 as u8) as u16],
        ValueType::Uint8 => vec![u16::from(value.as_i64() as u8)],
        ValueType::Int16 => vec![value.as_i64() as i16 as u16],
        ValueType::Uint16 => vec![value.as_i64() as u16],
        ValueType::Int32 | ValueType::Int32Swap => {
            split_words(&(value.as_i64() as i32).to_be_bytes())
        }
        ValueType::Uint32 | ValueType::Uint32Swap => {
            split_words(&(value.as_i64() as u32).to_be_bytes())
        }
        ValueType::Float32 | ValueType::Float32Swap => {
            split_words(&(value.as_f64() as f32).to_be_bytes())
        }
        ValueType::Int64 | ValueType::Int64Swap => split_words(&value.as_i64().to_be_bytes()),
        ValueType::Uint64 | ValueType::Uint64Swap => {
            split_words(&(value.as_i64() as u64).to_be_bytes())
        }
        ValueType::Float64 | ValueType::Float64Swap => split_words(&value.as_f64().to_be_bytes()),
    };

    let mut registers = registers;
    if value_type.has_word_swap() {
        registers.reverse();
    }
    Ok(registers)
}

fn split_words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Interpret a textual command as a boolean.
///
/// Accepts on/off, open/closed, true/false and numerics (zero is false).
pub fn command_to_bool(command: &str) -> Option<bool> {
    match command.trim().to_ascii_lowercase().as_str() {
        "on" | "open" | "true" => Some(true),
        "off" | "closed" | "false" => Some(false),
        other => other.parse::<f64>().ok().map(|n| n != 0.0),
    }
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use proptest::prelude::*;

    use super::*;

    macro_rules! round_trip {
        ($name:ident, $strategy:expr, $wrap:path, $ty:expr) => {
            proptest! {
                #[test]
                fn $name(v in $strategy) {
                    let value = $wrap(v);
                    let regs = command_to_registers(value, $ty).unwrap();
                    let decoded = extract_from_registers(&regs, 0, $ty).unwrap();
                    prop_assert_eq!(decoded, value);
                }
            }
        };
    }

    round_trip!(rt_bit, any::<bool>(), Value::Bool, ValueType::Bit);
    round_trip!(rt_i8, any::<i8>(), Value::I8, ValueType::Int8);
    round_trip!(rt_u8, any::<u8>(), Value::U8, ValueType::Uint8);
    round_trip!(rt_i16, any::<i16>(), Value::I16, ValueType::Int16);
    round_trip!(rt_u16, any::<u16>(), Value::U16, ValueType::Uint16);
    round_trip!(rt_i32, any::<i32>(), Value::I32, ValueType::Int32);
    round_trip!(rt_u32, any::<u32>(), Value::U32, ValueType::Uint32);
    round_trip!(rt_i64, any::<i64>(), Value::I64, ValueType::Int64);
    round_trip!(rt_u64, any::<u64>(), Value::U64, ValueType::Uint64);
    round_trip!(
        rt_i32_swap,
        any::<i32>(),
        Value::I32,
        ValueType::Int32Swap
    );
    round_trip!(
        rt_u64_swap,
        any::<u64>(),
        Value::U64,
        ValueType::Uint64Swap
    );
    round_trip!(
        rt_f32,
        proptest::num::f32::NORMAL,
        Value::F32,
        ValueType::Float32
    );
    round_trip!(
        rt_f64,
        proptest::num::f64::NORMAL,
        Value::F64,
        ValueType::Float64
    );
    round_trip!(
        rt_f32_swap,
        proptest::num::f32::NORMAL,
        Value::F32,
        ValueType::Float32Swap
    );
}
