//! Memory area definitions for S7 access.
//!
//! This module defines the [`MemoryArea`] enum which represents the memory
//! regions an S7 PLC exposes for byte-addressed reads and writes.
//!
//! # Memory Areas Overview
//!
//! | Area | Short name | Area code | Block number |
//! |------|:----------:|:---------:|:------------:|
//! | Data block | DB | 0x84 | ✓ |
//! | Process inputs | I | 0x81 | ✗ (always 0) |
//! | Process outputs | Q | 0x82 | ✗ (always 0) |
//! | Merker (flag memory) | M | 0x83 | ✗ (always 0) |
//!
//! # Example
//!
//! ```
//! use s7_poll::MemoryArea;
//!
//! let area: MemoryArea = "DB".parse().unwrap();
//! assert_eq!(area, MemoryArea::DataBlock);
//! assert_eq!(area.code(), 0x84);
//! assert_eq!(MemoryArea::Merker.to_string(), "M");
//! ```

use std::str::FromStr;

use crate::error::{S7Error, Result};

/// Memory areas addressable over the S7 protocol.
///
/// Only [`MemoryArea::DataBlock`] uses a block number; the other areas are
/// single flat regions and are always addressed with block 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemoryArea {
    /// DB - numbered data blocks.
    DataBlock,
    /// I - process image of inputs.
    Input,
    /// Q - process image of outputs.
    Output,
    /// M - merker/flag memory.
    Merker,
}

impl MemoryArea {
    /// All areas, in operator menu order.
    pub const ALL: [MemoryArea; 4] = [
        MemoryArea::DataBlock,
        MemoryArea::Output,
        MemoryArea::Input,
        MemoryArea::Merker,
    ];

    /// Returns the protocol area code sent on the wire.
    pub fn code(self) -> u8 {
        match self {
            MemoryArea::DataBlock => 0x84,
            MemoryArea::Output => 0x82,
            MemoryArea::Input => 0x81,
            MemoryArea::Merker => 0x83,
        }
    }

    /// Returns whether the block number is meaningful for this area.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_poll::MemoryArea;
    ///
    /// assert!(MemoryArea::DataBlock.uses_block_number());
    /// assert!(!MemoryArea::Input.uses_block_number());
    /// ```
    pub fn uses_block_number(self) -> bool {
        matches!(self, MemoryArea::DataBlock)
    }

    /// Maps a requested block number to the one actually addressed.
    pub(crate) fn effective_block(self, block: u16) -> u16 {
        if self.uses_block_number() {
            block
        } else {
            0
        }
    }
}

impl std::fmt::Display for MemoryArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryArea::DataBlock => write!(f, "DB"),
            MemoryArea::Input => write!(f, "I"),
            MemoryArea::Output => write!(f, "Q"),
            MemoryArea::Merker => write!(f, "M"),
        }
    }
}

impl FromStr for MemoryArea {
    type Err = S7Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DB" => Ok(MemoryArea::DataBlock),
            "I" | "E" => Ok(MemoryArea::Input),
            "Q" | "A" => Ok(MemoryArea::Output),
            "M" => Ok(MemoryArea::Merker),
            other => Err(S7Error::invalid_parameter(
                "area",
                format!("unknown memory area '{other}', expected DB, I, Q or M"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_codes() {
        assert_eq!(MemoryArea::DataBlock.code(), 0x84);
        assert_eq!(MemoryArea::Output.code(), 0x82);
        assert_eq!(MemoryArea::Input.code(), 0x81);
        assert_eq!(MemoryArea::Merker.code(), 0x83);
    }

    #[test]
    fn test_effective_block() {
        assert_eq!(MemoryArea::DataBlock.effective_block(12), 12);
        assert_eq!(MemoryArea::Input.effective_block(12), 0);
        assert_eq!(MemoryArea::Output.effective_block(7), 0);
        assert_eq!(MemoryArea::Merker.effective_block(1), 0);
    }

    #[test]
    fn test_display_parse() {
        for area in MemoryArea::ALL {
            assert_eq!(area.to_string().parse::<MemoryArea>().unwrap(), area);
        }
        assert_eq!("db".parse::<MemoryArea>().unwrap(), MemoryArea::DataBlock);
        assert_eq!(" q ".parse::<MemoryArea>().unwrap(), MemoryArea::Output);
        assert!("DX".parse::<MemoryArea>().is_err());
    }
}
