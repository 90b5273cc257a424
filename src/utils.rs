//! Utility functions for byte-level bit manipulation and formatting.
//!
//! S7 bit addresses such as `M1.7` select one bit inside a byte. These helpers
//! back the `Bool` codec and are handy when inspecting raw reads.
//!
//! # Example
//!
//! ```
//! use s7_poll::utils::{get_bit, set_bit, byte_to_bits, format_binary};
//!
//! let value: u8 = 0b1010_0101;
//!
//! assert!(get_bit(value, 0));
//! assert!(!get_bit(value, 1));
//!
//! let modified = set_bit(value, 1, true);
//! assert_eq!(modified, 0b1010_0111);
//!
//! let bits = byte_to_bits(value);
//! assert!(bits[7]);
//!
//! assert_eq!(format_binary(value), "0b1010_0101");
//! ```

/// Gets a single bit from a byte.
///
/// # Arguments
///
/// * `value` - The byte to extract from
/// * `bit` - Bit position (0-7, where 0 is LSB); higher positions read as `false`
///
/// # Example
///
/// ```
/// use s7_poll::utils::get_bit;
///
/// let value: u8 = 0b0000_0101;
/// assert!(get_bit(value, 0));
/// assert!(!get_bit(value, 1));
/// assert!(get_bit(value, 2));
/// ```
#[inline]
pub fn get_bit(value: u8, bit: u8) -> bool {
    (value & mask(bit)) != 0
}

/// Sets or clears a single bit in a byte, leaving the other seven untouched.
///
/// # Example
///
/// ```
/// use s7_poll::utils::set_bit;
///
/// assert_eq!(set_bit(0, 5, true), 0b0010_0000);
/// assert_eq!(set_bit(0xFF, 0, false), 0xFE);
/// ```
#[inline]
pub fn set_bit(value: u8, bit: u8, state: bool) -> u8 {
    if state {
        value | mask(bit)
    } else {
        value & !mask(bit)
    }
}

/// Toggles a single bit in a byte.
#[inline]
pub fn toggle_bit(value: u8, bit: u8) -> u8 {
    value ^ mask(bit)
}

/// Single-bit mask; positions above 7 select nothing.
#[inline]
fn mask(bit: u8) -> u8 {
    1u8.checked_shl(u32::from(bit)).unwrap_or(0)
}

/// Converts a byte to an array of 8 booleans, index 0 being the LSB.
pub fn byte_to_bits(value: u8) -> [bool; 8] {
    let mut bits = [false; 8];
    for (i, slot) in bits.iter_mut().enumerate() {
        *slot = get_bit(value, i as u8);
    }
    bits
}

/// Converts an array of 8 booleans (index 0 = LSB) back to a byte.
pub fn bits_to_byte(bits: &[bool; 8]) -> u8 {
    bits.iter()
        .enumerate()
        .filter(|&(_, &bit)| bit)
        .fold(0u8, |acc, (i, _)| acc | (1 << i))
}

/// Formats a byte as "0b0000_0000".
pub fn format_binary(value: u8) -> String {
    let binary = format!("{:08b}", value);
    format!("0b{}_{}", &binary[0..4], &binary[4..8])
}

/// Formats a byte slice as space-separated hex, e.g. "14 05 48 65".
///
/// # Example
///
/// ```
/// use s7_poll::utils::format_hex;
///
/// assert_eq!(format_hex(&[0x14, 0x05, 0xAB]), "14 05 AB");
/// assert_eq!(format_hex(&[]), "");
/// ```
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
