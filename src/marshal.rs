//! Typed reads and writes through the shared connection.
//!
//! [`Marshaller`] turns `(area, block, address, type)` into exactly the byte
//! range the type occupies, and decodes or encodes it with [`crate::value`].
//!
//! One-shot operations return `Result`, so a failed read is never mistaken
//! for a stored zero. Polling uses [`Marshaller::read_or_default`], which
//! reports the per-type default together with an explicit `ok` flag.
//!
//! # Example
//!
//! ```
//! use s7_poll::{Address, Endpoint, Marshaller, MemoryArea, SharedConnection, SimulatedPlc};
//!
//! let conn = SharedConnection::new(SimulatedPlc::new());
//! conn.connect(&Endpoint::new("192.168.0.16", 0, 1))?;
//! let plc = Marshaller::new(conn);
//!
//! plc.write_i16(MemoryArea::DataBlock, 1, 18, -1234)?;
//! assert_eq!(plc.read_i16(MemoryArea::DataBlock, 1, 18)?, -1234);
//!
//! plc.write_bool(MemoryArea::Merker, 0, Address::bit(1, 7)?, true)?;
//! assert!(plc.read_bool(MemoryArea::Merker, 0, Address::bit(1, 7)?)?);
//! # Ok::<(), s7_poll::S7Error>(())
//! ```

use log::debug;

use crate::address::{Address, MAX_BIT};
use crate::connection::SharedConnection;
use crate::error::{S7Error, Result};
use crate::memory::MemoryArea;
use crate::value::{self, Value, ValueType};

/// Outcome of a best-effort read.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Decoded value, or the type's default when the read failed.
    pub value: Value,
    /// `false` when the transport call failed and `value` is the default.
    pub ok: bool,
}

/// Typed access to PLC memory.
#[derive(Debug, Clone)]
pub struct Marshaller {
    conn: SharedConnection,
}

impl Marshaller {
    /// Creates a marshaller over a shared connection handle.
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Returns the underlying connection handle.
    pub fn connection(&self) -> &SharedConnection {
        &self.conn
    }

    /// Reads a value of type `ty` at `address`.
    ///
    /// # Errors
    ///
    /// Returns `AddressFormat` if the address's bit part does not match the
    /// type, or the transport error if the read fails.
    pub fn read(
        &self,
        area: MemoryArea,
        block: u16,
        address: Address,
        ty: ValueType,
    ) -> Result<Value> {
        check_address(address, ty)?;
        let bytes = self
            .conn
            .read_bytes(area, block, address.byte, ty.wire_len())?;
        value::decode(&bytes, ty, address.bit_or_zero())
    }

    /// Writes `value` as type `ty` at `address`.
    ///
    /// `Bool` is a read-modify-write of the containing byte, performed under a
    /// single connection lock so concurrent bit writes to the same byte keep
    /// each other's updates.
    ///
    /// # Errors
    ///
    /// Returns `AddressFormat` for a mismatched address, `InvalidParameter`
    /// if the value cannot be encoded as `ty`, or the transport error.
    pub fn write(
        &self,
        area: MemoryArea,
        block: u16,
        address: Address,
        ty: ValueType,
        value: &Value,
    ) -> Result<()> {
        check_address(address, ty)?;
        match (ty, value) {
            (ValueType::Bool, Value::Bool(state)) => {
                let bit = address.bit_or_zero();
                self.conn.with_locked(|session| {
                    let current = session.read_bytes(area, block, address.byte, 1)?[0];
                    let updated = value::encode_bit(current, bit, *state);
                    session.write_bytes(area, block, address.byte, &[updated])
                })
            }
            _ => {
                let bytes = value::encode(value, ty)?;
                self.conn.write_bytes(area, block, address.byte, &bytes)
            }
        }
    }

    /// Reads like [`read`](Self::read) but never fails on transport errors:
    /// those yield `ty.default_value()` with `ok == false`.
    ///
    /// # Errors
    ///
    /// Only for a mismatched address, which is a caller bug rather than a
    /// device condition.
    pub fn read_or_default(
        &self,
        area: MemoryArea,
        block: u16,
        address: Address,
        ty: ValueType,
    ) -> Result<Reading> {
        check_address(address, ty)?;
        match self.read(area, block, address, ty) {
            Ok(value) => Ok(Reading { value, ok: true }),
            Err(e) => {
                debug!("read {area}{block} @{address} as {ty} fell back to default: {e}");
                Ok(Reading {
                    value: ty.default_value(),
                    ok: false,
                })
            }
        }
    }

    /// Reads one bit.
    ///
    /// # Errors
    ///
    /// `address` must carry a bit offset; see [`read`](Self::read).
    pub fn read_bool(&self, area: MemoryArea, block: u16, address: Address) -> Result<bool> {
        match self.read(area, block, address, ValueType::Bool)? {
            Value::Bool(v) => Ok(v),
            other => Err(unexpected(other)),
        }
    }

    /// Sets or clears one bit, leaving the other bits of the byte unchanged.
    ///
    /// # Errors
    ///
    /// `address` must carry a bit offset; see [`write`](Self::write).
    pub fn write_bool(
        &self,
        area: MemoryArea,
        block: u16,
        address: Address,
        value: bool,
    ) -> Result<()> {
        self.write(area, block, address, ValueType::Bool, &Value::Bool(value))
    }

    /// Reads a big-endian INT.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read).
    pub fn read_i16(&self, area: MemoryArea, block: u16, byte: u32) -> Result<i16> {
        match self.read(area, block, Address::byte(byte), ValueType::Int16)? {
            Value::Int16(v) => Ok(v),
            other => Err(unexpected(other)),
        }
    }

    /// Writes a big-endian INT.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn write_i16(&self, area: MemoryArea, block: u16, byte: u32, value: i16) -> Result<()> {
        self.write(area, block, Address::byte(byte), ValueType::Int16, &Value::Int16(value))
    }

    /// Reads a big-endian REAL.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read).
    pub fn read_f32(&self, area: MemoryArea, block: u16, byte: u32) -> Result<f32> {
        match self.read(area, block, Address::byte(byte), ValueType::Float32)? {
            Value::Float32(v) => Ok(v),
            other => Err(unexpected(other)),
        }
    }

    /// Writes a big-endian REAL.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn write_f32(&self, area: MemoryArea, block: u16, byte: u32, value: f32) -> Result<()> {
        self.write(
            area,
            block,
            Address::byte(byte),
            ValueType::Float32,
            &Value::Float32(value),
        )
    }

    /// Reads an S7 STRING declared with `max_len` characters.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read).
    pub fn read_string(
        &self,
        area: MemoryArea,
        block: u16,
        byte: u32,
        max_len: u8,
    ) -> Result<String> {
        match self.read(area, block, Address::byte(byte), ValueType::FixedString { max_len })? {
            Value::FixedString(s) => Ok(s),
            other => Err(unexpected(other)),
        }
    }

    /// Writes an S7 STRING, truncating `value` to `max_len` characters.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn write_string(
        &self,
        area: MemoryArea,
        block: u16,
        byte: u32,
        value: &str,
        max_len: u8,
    ) -> Result<()> {
        self.write(
            area,
            block,
            Address::byte(byte),
            ValueType::FixedString { max_len },
            &Value::FixedString(value.to_string()),
        )
    }

    /// Reads one CHAR.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read).
    pub fn read_char(&self, area: MemoryArea, block: u16, byte: u32) -> Result<char> {
        match self.read(area, block, Address::byte(byte), ValueType::Char)? {
            Value::Char(c) => Ok(c),
            other => Err(unexpected(other)),
        }
    }

    /// Writes one CHAR.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn write_char(&self, area: MemoryArea, block: u16, byte: u32, value: char) -> Result<()> {
        self.write(area, block, Address::byte(byte), ValueType::Char, &Value::Char(value))
    }
}

pub(crate) fn check_address(address: Address, ty: ValueType) -> Result<()> {
    match (ty.is_bit_addressed(), address.bit) {
        (true, None) => Err(S7Error::address_format(format!(
            "{ty} requires an explicit bit offset, e.g. {}.0",
            address.byte
        ))),
        (false, Some(bit)) => Err(S7Error::address_format(format!(
            "{ty} is byte-addressed, got bit offset {bit}"
        ))),
        (true, Some(bit)) if bit > MAX_BIT => Err(S7Error::address_format(format!(
            "bit offset {bit} is outside 0-{MAX_BIT}"
        ))),
        _ => Ok(()),
    }
}

fn unexpected(value: Value) -> S7Error {
    S7Error::transport(format!("decoded unexpected value {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Endpoint;
    use crate::simulator::SimulatedPlc;
    use crate::task::AcquisitionSignature;
    use proptest::prelude::*;
    use std::thread;

    const DB: MemoryArea = MemoryArea::DataBlock;

    fn setup() -> (SimulatedPlc, Marshaller) {
        let plc = SimulatedPlc::new();
        let conn = SharedConnection::new(plc.clone());
        conn.connect(&Endpoint::new("sim", 0, 1)).unwrap();
        (plc, Marshaller::new(conn))
    }

    #[test]
    fn test_int16_wire_bytes() {
        let (plc, m) = setup();
        m.write_i16(DB, 1, 18, 0x0102).unwrap();
        assert_eq!(hex::encode(plc.peek(DB, 1, 18, 2)), "0102");
        m.write_i16(DB, 1, 18, -32768).unwrap();
        assert_eq!(m.read_i16(DB, 1, 18).unwrap(), -32768);
    }

    #[test]
    fn test_float32_roundtrip_bit_exact() {
        let (_plc, m) = setup();
        for x in [0.0f32, -0.0, 1.5, -123.25, f32::MIN_POSITIVE] {
            m.write_f32(DB, 2, 4, x).unwrap();
            assert_eq!(m.read_f32(DB, 2, 4).unwrap().to_bits(), x.to_bits());
        }
    }

    #[test]
    fn test_string_truncated_to_max_len() {
        let (plc, m) = setup();
        let value = "0123456789ABCDEFGHIJKLMNO";
        m.write_string(DB, 5, 0, value, 20).unwrap();

        let stored = plc.peek(DB, 5, 0, 22);
        assert_eq!(stored[0], 20);
        assert_eq!(stored[1], 20);
        assert_eq!(m.read_string(DB, 5, 0, 20).unwrap(), &value[..20]);
    }

    #[test]
    fn test_string_shorter_than_max() {
        let (plc, m) = setup();
        plc.poke(DB, 5, 0, &[20, 20]);
        m.write_string(DB, 5, 0, "abc", 20).unwrap();
        assert_eq!(&plc.peek(DB, 5, 0, 6), &[20, 3, b'a', b'b', b'c', 0]);
        assert_eq!(m.read_string(DB, 5, 0, 20).unwrap(), "abc");
    }

    #[test]
    fn test_char() {
        let (plc, m) = setup();
        m.write_char(MemoryArea::Merker, 0, 7, 'Q').unwrap();
        assert_eq!(plc.peek(MemoryArea::Merker, 0, 7, 1), vec![b'Q']);
        assert_eq!(m.read_char(MemoryArea::Merker, 0, 7).unwrap(), 'Q');
    }

    #[test]
    fn test_bool_read_modify_write() {
        let (plc, m) = setup();
        plc.poke(MemoryArea::Output, 0, 1, &[0b0101_0101]);

        m.write_bool(MemoryArea::Output, 0, Address::bit(1, 1).unwrap(), true)
            .unwrap();
        assert_eq!(plc.peek(MemoryArea::Output, 0, 1, 1), vec![0b0101_0111]);

        m.write_bool(MemoryArea::Output, 0, Address::bit(1, 0).unwrap(), false)
            .unwrap();
        assert_eq!(plc.peek(MemoryArea::Output, 0, 1, 1), vec![0b0101_0110]);
        assert!(m.read_bool(MemoryArea::Output, 0, Address::bit(1, 2).unwrap()).unwrap());
    }

    #[test]
    fn test_concurrent_bit_writes_keep_each_other() {
        let (plc, m) = setup();
        plc.set_latency(std::time::Duration::from_millis(1));

        let handles: Vec<_> = (0..8u8)
            .map(|bit| {
                let m = m.clone();
                thread::spawn(move || {
                    m.write_bool(MemoryArea::Merker, 0, Address::bit(3, bit).unwrap(), true)
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(plc.peek(MemoryArea::Merker, 0, 3, 1), vec![0xFF]);
        assert!(!plc.overlap_detected());
    }

    #[test]
    fn test_bit_address_mismatch_is_rejected_before_transport() {
        let (plc, m) = setup();
        assert!(matches!(
            m.read(DB, 1, Address::byte(1), ValueType::Bool),
            Err(S7Error::AddressFormat { .. })
        ));
        assert!(matches!(
            m.read(DB, 1, Address::bit(1, 3).unwrap(), ValueType::Int16),
            Err(S7Error::AddressFormat { .. })
        ));
        assert_eq!(plc.call_count(), 0);
    }

    #[test]
    fn test_out_of_range_bit_rejected_before_transport() {
        let (plc, m) = setup();
        plc.poke(MemoryArea::Merker, 0, 1, &[0x00]);
        let calls = plc.call_count();
        let address = Address {
            byte: 1,
            bit: Some(9),
        };

        assert!(matches!(
            m.write_bool(MemoryArea::Merker, 0, address, true),
            Err(S7Error::AddressFormat { .. })
        ));
        assert!(matches!(
            m.read_bool(MemoryArea::Merker, 0, address),
            Err(S7Error::AddressFormat { .. })
        ));
        let signature = AcquisitionSignature::new(MemoryArea::Merker, 0, address, ValueType::Bool);
        assert!(signature.is_err());
        assert_eq!(plc.call_count(), calls);
        assert_eq!(plc.peek(MemoryArea::Merker, 0, 1, 1), vec![0x00]);
    }

    #[test]
    fn test_failed_read_is_distinguishable() {
        let (plc, m) = setup();
        plc.fail_reads(true);

        assert!(m.read_i16(DB, 1, 0).unwrap_err().is_transport());

        let reading = m
            .read_or_default(DB, 1, Address::byte(0), ValueType::Int16)
            .unwrap();
        assert_eq!(reading, Reading { value: Value::Int16(0), ok: false });
    }

    #[test]
    fn test_read_or_default_defaults() {
        let (plc, m) = setup();
        plc.fail_reads(true);
        let cases = [
            (ValueType::Bool, Address::bit(0, 0).unwrap(), Value::Bool(false)),
            (ValueType::Float32, Address::byte(0), Value::Float32(0.0)),
            (
                ValueType::FixedString { max_len: 20 },
                Address::byte(0),
                Value::FixedString(String::new()),
            ),
            (ValueType::Char, Address::byte(0), Value::Char('\0')),
        ];
        for (ty, addr, default) in cases {
            let reading = m.read_or_default(DB, 1, addr, ty).unwrap();
            assert!(!reading.ok);
            assert_eq!(reading.value, default);
        }
    }

    #[test]
    fn test_failed_bool_write_leaves_byte() {
        let (plc, m) = setup();
        plc.poke(DB, 1, 0, &[0x0F]);
        plc.fail_writes(true);
        assert!(m.write_bool(DB, 1, Address::bit(0, 7).unwrap(), true).is_err());
        assert_eq!(plc.peek(DB, 1, 0, 1), vec![0x0F]);
    }

    #[test]
    fn test_not_connected() {
        let m = Marshaller::new(SharedConnection::new(SimulatedPlc::new()));
        assert!(matches!(m.read_i16(DB, 1, 0), Err(S7Error::NotConnected)));
    }

    proptest! {
        #[test]
        fn prop_bool_write_touches_only_its_bit(
            initial in any::<u8>(),
            bit in 0u8..8,
            v in any::<bool>(),
        ) {
            let (plc, m) = setup();
            plc.poke(MemoryArea::Merker, 0, 1, &[initial]);
            let addr = Address::bit(1, bit).unwrap();

            m.write_bool(MemoryArea::Merker, 0, addr, v).unwrap();
            prop_assert_eq!(m.read_bool(MemoryArea::Merker, 0, addr).unwrap(), v);

            let stored = plc.peek(MemoryArea::Merker, 0, 1, 1)[0];
            prop_assert_eq!(stored & !(1 << bit), initial & !(1 << bit));
        }

        #[test]
        fn prop_int16_roundtrip(x in any::<i16>()) {
            let (_plc, m) = setup();
            m.write_i16(DB, 1, 18, x).unwrap();
            prop_assert_eq!(m.read_i16(DB, 1, 18).unwrap(), x);
        }
    }
}
