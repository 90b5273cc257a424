//! Byte/bit address parsing.
//!
//! Operators type start addresses as text: `18` selects byte 18, `1.7`
//! selects bit 7 of byte 1. Whether a bit part is required or forbidden
//! depends on the value type being accessed, so the caller says which.
//!
//! # Example
//!
//! ```
//! use s7_poll::Address;
//!
//! let addr = Address::parse("1.7", true).unwrap();
//! assert_eq!(addr.byte, 1);
//! assert_eq!(addr.bit, Some(7));
//!
//! // Bool access needs an explicit bit offset
//! assert!(Address::parse("1", true).is_err());
//! // Other types must not carry one
//! assert!(Address::parse("1.5", false).is_err());
//! ```

use crate::error::{S7Error, Result};

/// Highest bit position inside a byte.
pub const MAX_BIT: u8 = 7;

/// Start address of a value within a memory area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    /// Zero-based byte offset. No upper bound is enforced here.
    pub byte: u32,
    /// Bit position (0-7), present only for bit-addressed values.
    pub bit: Option<u8>,
}

impl Address {
    /// Creates a byte address without a bit part.
    pub fn byte(byte: u32) -> Self {
        Self { byte, bit: None }
    }

    /// Creates a bit address.
    ///
    /// # Errors
    ///
    /// Returns an error if bit > 7.
    pub fn bit(byte: u32, bit: u8) -> Result<Self> {
        if bit > MAX_BIT {
            return Err(S7Error::address_format(format!(
                "bit offset {bit} is outside 0-{MAX_BIT}"
            )));
        }
        Ok(Self {
            byte,
            bit: Some(bit),
        })
    }

    /// Bit position, 0 when the address has no bit part.
    pub fn bit_or_zero(self) -> u8 {
        self.bit.unwrap_or(0)
    }

    /// Parses address text.
    ///
    /// With `allow_bit` the text must be `<byte>.<bit>` with bit in 0-7;
    /// without it the text must be a plain byte offset. Surrounding
    /// whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`S7Error::AddressFormat`] when the text does not match the
    /// expected shape or a part is not a non-negative integer.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_poll::Address;
    ///
    /// assert_eq!(Address::parse("18", false).unwrap(), Address::byte(18));
    /// assert_eq!(Address::parse("1.7", true).unwrap(), Address::bit(1, 7).unwrap());
    /// ```
    pub fn parse(text: &str, allow_bit: bool) -> Result<Self> {
        let text = text.trim();

        match text.split_once('.') {
            None if allow_bit => Err(S7Error::address_format(
                "bit-addressed types require an explicit bit offset, e.g. 1.7",
            )),
            None => Ok(Self::byte(parse_byte(text)?)),
            Some(_) if !allow_bit => Err(S7Error::address_format(format!(
                "'{text}' has a bit offset but this type is byte-addressed"
            ))),
            Some((byte, bit)) => {
                if bit.is_empty() || bit.contains('.') {
                    return Err(S7Error::address_format(format!(
                        "'{text}' is not of the form <byte>.<bit>, e.g. 1.7"
                    )));
                }
                let byte = parse_byte(byte)?;
                let bit = bit.parse::<u8>().map_err(|_| {
                    S7Error::address_format(format!("bit offset '{bit}' is not a number in 0-7"))
                })?;
                Self::bit(byte, bit)
            }
        }
    }
}

fn parse_byte(text: &str) -> Result<u32> {
    text.parse::<u32>().map_err(|_| {
        S7Error::address_format(format!("byte offset '{text}' is not a non-negative integer"))
    })
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.bit {
            Some(bit) => write!(f, "{}.{}", self.byte, bit),
            None => write!(f, "{}", self.byte),
        }
    }
}
