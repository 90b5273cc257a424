//! Typed values and their S7 wire encoding.
//!
//! All multi-byte values are big-endian. Text is Latin-1, one byte per
//! character.
//!
//! | Type | Wire size | Layout |
//! |------|-----------|--------|
//! | `Bool` | 1 byte (shared) | bit `n` of the byte: `byte & (1 << n)` |
//! | `Int16` | 2 bytes | two's complement, big-endian |
//! | `Float32` | 4 bytes | IEEE-754 single, big-endian |
//! | `Char` | 1 byte | raw Latin-1 code |
//! | `FixedString { max_len }` | `max_len + 2` | `[max_len][cur_len][payload...]`, no terminator |
//!
//! # Example
//!
//! ```
//! use s7_poll::{value, Value, ValueType};
//!
//! let ty = ValueType::FixedString { max_len: 4 };
//! let bytes = value::encode(&Value::FixedString("Hello".into()), ty).unwrap();
//! assert_eq!(bytes, [4, 4, b'H', b'e', b'l', b'l']);
//!
//! let back = value::decode(&bytes, ty, 0).unwrap();
//! assert_eq!(back, Value::FixedString("Hell".into()));
//! ```

use crate::error::{S7Error, Result};
use crate::utils::{get_bit, set_bit};

/// Largest declared length an S7 string can carry.
pub const MAX_STRING_LEN: u8 = 254;

/// Declared length used when none is configured.
pub const DEFAULT_STRING_LEN: u8 = 20;

/// Data type of a value in PLC memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueType {
    /// Single bit inside a byte.
    Bool,
    /// Signed 16-bit integer (S7 INT).
    Int16,
    /// IEEE-754 single precision (S7 REAL).
    Float32,
    /// S7 STRING with a declared maximum length.
    FixedString {
        /// Declared maximum number of characters (0-254).
        max_len: u8,
    },
    /// One Latin-1 character (S7 CHAR).
    Char,
}

impl ValueType {
    /// Number of bytes read or written for this type.
    pub fn wire_len(self) -> usize {
        match self {
            ValueType::Bool | ValueType::Char => 1,
            ValueType::Int16 => 2,
            ValueType::Float32 => 4,
            ValueType::FixedString { max_len } => max_len as usize + 2,
        }
    }

    /// Returns whether addresses of this type carry a bit offset.
    pub fn is_bit_addressed(self) -> bool {
        matches!(self, ValueType::Bool)
    }

    /// Value reported when a read fails.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_poll::{Value, ValueType};
    ///
    /// assert_eq!(ValueType::Int16.default_value(), Value::Int16(0));
    /// assert_eq!(ValueType::Char.default_value(), Value::Char('\0'));
    /// ```
    pub fn default_value(self) -> Value {
        match self {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int16 => Value::Int16(0),
            ValueType::Float32 => Value::Float32(0.0),
            ValueType::FixedString { .. } => Value::FixedString(String::new()),
            ValueType::Char => Value::Char('\0'),
        }
    }

    /// Operator-facing short name: `bool`, `int`, `float`, `string` or `char`.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int16 => "int",
            ValueType::Float32 => "float",
            ValueType::FixedString { .. } => "string",
            ValueType::Char => "char",
        }
    }

    /// Parses an operator-facing type name. `string` gets `string_len` as its
    /// declared length.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for unknown names.
    pub fn from_name(name: &str, string_len: u8) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bool" => Ok(ValueType::Bool),
            "int" | "int16" => Ok(ValueType::Int16),
            "float" | "real" | "float32" => Ok(ValueType::Float32),
            "string" => Ok(ValueType::FixedString {
                max_len: string_len,
            }),
            "char" => Ok(ValueType::Char),
            other => Err(S7Error::invalid_parameter(
                "type",
                format!("unknown data type '{other}'"),
            )),
        }
    }

    fn check_string_len(max_len: u8) -> Result<()> {
        if max_len > MAX_STRING_LEN {
            return Err(S7Error::invalid_parameter(
                "max_len",
                format!("S7 strings hold at most {MAX_STRING_LEN} characters, got {max_len}"),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::Bool => write!(f, "Bool"),
            ValueType::Int16 => write!(f, "Int16"),
            ValueType::Float32 => write!(f, "Float32"),
            ValueType::FixedString { max_len } => write!(f, "String[{max_len}]"),
            ValueType::Char => write!(f, "Char"),
        }
    }
}

/// A decoded value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// Bit value.
    Bool(bool),
    /// 16-bit integer.
    Int16(i16),
    /// Single precision float.
    Float32(f32),
    /// String payload (without the two length bytes).
    FixedString(String),
    /// Single character.
    Char(char),
}

impl Value {
    /// Returns whether this value can be stored as `ty`.
    pub fn fits(&self, ty: ValueType) -> bool {
        matches!(
            (self, ty),
            (Value::Bool(_), ValueType::Bool)
                | (Value::Int16(_), ValueType::Int16)
                | (Value::Float32(_), ValueType::Float32)
                | (Value::FixedString(_), ValueType::FixedString { .. })
                | (Value::Char(_), ValueType::Char)
        )
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(true) => write!(f, "TRUE"),
            Value::Bool(false) => write!(f, "FALSE"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::FixedString(s) => write!(f, "{s}"),
            Value::Char(c) => write!(f, "{c}"),
        }
    }
}

/// Encodes a byte-addressed value into its wire bytes.
///
/// `Bool` is not handled here: a bit shares its byte with seven others and
/// is written with [`encode_bit`] on the byte currently stored.
///
/// Strings longer than the declared length are truncated to `max_len`
/// characters before encoding.
///
/// # Errors
///
/// Returns `InvalidParameter` if the value does not match `ty`, if `ty` is
/// `Bool`, if a character is outside Latin-1, or if `max_len` exceeds 254.
pub fn encode(value: &Value, ty: ValueType) -> Result<Vec<u8>> {
    match (value, ty) {
        (Value::Int16(v), ValueType::Int16) => Ok(v.to_be_bytes().to_vec()),
        (Value::Float32(v), ValueType::Float32) => Ok(v.to_be_bytes().to_vec()),
        (Value::Char(c), ValueType::Char) => Ok(vec![latin1_byte(*c)?]),
        (Value::FixedString(s), ValueType::FixedString { max_len }) => {
            ValueType::check_string_len(max_len)?;
            let payload = s
                .chars()
                .take(max_len as usize)
                .map(latin1_byte)
                .collect::<Result<Vec<u8>>>()?;

            let mut buffer = vec![0u8; ty.wire_len()];
            buffer[0] = max_len;
            buffer[1] = payload.len() as u8;
            buffer[2..2 + payload.len()].copy_from_slice(&payload);
            Ok(buffer)
        }
        (Value::Bool(_), ValueType::Bool) => Err(S7Error::invalid_parameter(
            "value",
            "bool values are written bit-wise into the current byte",
        )),
        (value, ty) => Err(S7Error::invalid_parameter(
            "value",
            format!("{value:?} cannot be stored as {ty}"),
        )),
    }
}

/// Returns `current` with bit `bit` set to `value`; the other seven bits are kept.
#[inline]
pub fn encode_bit(current: u8, bit: u8, value: bool) -> u8 {
    set_bit(current, bit, value)
}

/// Decodes wire bytes read for `ty`. `bit` is only used for `Bool`.
///
/// For strings the stored current length is clamped to the declared
/// maximum, so a corrupted length byte never reads past the payload.
///
/// # Errors
///
/// Returns `Transport` if fewer than [`ValueType::wire_len`] bytes were
/// supplied, and `InvalidParameter` for a bit above 7 or `max_len` above 254.
pub fn decode(bytes: &[u8], ty: ValueType, bit: u8) -> Result<Value> {
    if bytes.len() < ty.wire_len() {
        return Err(S7Error::transport(format!(
            "short read: {ty} needs {} bytes, got {}",
            ty.wire_len(),
            bytes.len()
        )));
    }

    match ty {
        ValueType::Bool => {
            if bit > crate::address::MAX_BIT {
                return Err(S7Error::invalid_parameter("bit", "must be 0-7"));
            }
            Ok(Value::Bool(get_bit(bytes[0], bit)))
        }
        ValueType::Int16 => Ok(Value::Int16(i16::from_be_bytes([bytes[0], bytes[1]]))),
        ValueType::Float32 => Ok(Value::Float32(f32::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        ValueType::Char => Ok(Value::Char(bytes[0] as char)),
        ValueType::FixedString { max_len } => {
            ValueType::check_string_len(max_len)?;
            let current = bytes[1].min(max_len) as usize;
            Ok(Value::FixedString(
                bytes[2..2 + current].iter().map(|&b| b as char).collect(),
            ))
        }
    }
}

fn latin1_byte(c: char) -> Result<u8> {
    u8::try_from(u32::from(c)).map_err(|_| {
        S7Error::invalid_parameter(
            "value",
            format!("character {c:?} cannot be stored in a single byte"),
        )
    })
}
