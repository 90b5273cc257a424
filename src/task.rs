//! Polling task descriptions.

use crate::address::Address;
use crate::error::Result;
use crate::marshal::check_address;
use crate::memory::MemoryArea;
use crate::value::{Value, ValueType};

/// What a polling task reads, independent of how often.
///
/// Two tasks with equal signatures would read the same bytes and decode them
/// the same way, so the registry runs at most one of them. For areas other
/// than data blocks the block number is normalized to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AcquisitionSignature {
    area: MemoryArea,
    block: u16,
    address: Address,
    value_type: ValueType,
}

impl AcquisitionSignature {
    /// Creates a signature.
    ///
    /// # Errors
    ///
    /// Returns `AddressFormat` if `address` has a bit part and `value_type`
    /// is not `Bool`, or lacks one and it is.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_poll::{AcquisitionSignature, Address, MemoryArea, ValueType};
    ///
    /// let m1_7 = Address::bit(1, 7)?;
    /// let sig = AcquisitionSignature::new(MemoryArea::Merker, 5, m1_7, ValueType::Bool)?;
    /// assert_eq!(sig.block(), 0);
    ///
    /// let m1 = Address::byte(1);
    /// assert!(AcquisitionSignature::new(MemoryArea::Merker, 0, m1, ValueType::Bool).is_err());
    /// # Ok::<(), s7_poll::S7Error>(())
    /// ```
    pub fn new(
        area: MemoryArea,
        block: u16,
        address: Address,
        value_type: ValueType,
    ) -> Result<Self> {
        check_address(address, value_type)?;
        Ok(Self {
            area,
            block: area.effective_block(block),
            address,
            value_type,
        })
    }

    /// Memory area read.
    pub fn area(&self) -> MemoryArea {
        self.area
    }

    /// Data block number (0 outside data blocks).
    pub fn block(&self) -> u16 {
        self.block
    }

    /// Start address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Decoded type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }
}

impl std::fmt::Display for AcquisitionSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "area {}", self.area)?;
        if self.area.uses_block_number() {
            write!(f, " block {}", self.block)?;
        }
        write!(f, " start {} type {}", self.address, self.value_type.name())
    }
}

/// Snapshot of an active polling task.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Task {
    /// Slot id, 1..=capacity.
    pub id: u8,
    /// What the task reads.
    pub signature: AcquisitionSignature,
    /// Tick period in milliseconds.
    pub interval_ms: u64,
    /// Ticks performed so far, failed reads included.
    pub execution_count: u64,
}

impl std::fmt::Display for Task {
    /// One-line description, e.g.
    /// `[Task 3] area DB block 1 start 18 type int interval 500ms executed 12`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[Task {}] {} interval {}ms executed {}",
            self.id, self.signature, self.interval_ms, self.execution_count
        )
    }
}

/// Builds the status line reported for one tick.
pub(crate) fn tick_message(signature: &AcquisitionSignature, value: &Value) -> String {
    format!(
        "{} offset {} value {}",
        signature.value_type(),
        signature.address(),
        value
    )
}
