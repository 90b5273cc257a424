//! Connection contract and the lock-guarded shared handle.
//!
//! The device transport is not reentrant: at most one read or write may be in
//! flight at any time. [`SharedConnection`] is the only path to a
//! [`Connection`] once it is handed over; every polling worker and the
//! interactive path clone the handle and every call takes the same lock.
//!
//! # Example
//!
//! ```
//! use s7_poll::{Endpoint, MemoryArea, SharedConnection, SimulatedPlc};
//!
//! let conn = SharedConnection::new(SimulatedPlc::new());
//! conn.connect(&Endpoint::new("192.168.0.16", 0, 1))?;
//!
//! conn.write_bytes(MemoryArea::DataBlock, 1, 18, &[0x12, 0x34])?;
//! assert_eq!(conn.read_bytes(MemoryArea::DataBlock, 1, 18, 2)?, vec![0x12, 0x34]);
//! # Ok::<(), s7_poll::S7Error>(())
//! ```

use std::sync::Arc;

use log::{info, trace, warn};
use parking_lot::Mutex;

use crate::error::{S7Error, Result};
use crate::memory::MemoryArea;

/// Default rack of S7-1200/1500 CPUs.
pub const DEFAULT_RACK: u16 = 0;

/// Default slot of S7-1200/1500 CPUs.
pub const DEFAULT_SLOT: u16 = 1;

/// Where to reach the PLC.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// Rack number of the CPU.
    pub rack: u16,
    /// Slot number of the CPU.
    pub slot: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(host: impl Into<String>, rack: u16, slot: u16) -> Self {
        Self {
            host: host.into(),
            rack,
            slot,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} rack {} slot {}", self.host, self.rack, self.slot)
    }
}

/// Raw byte access to a PLC.
///
/// Implementations wrap a concrete transport. They are never called
/// concurrently: [`SharedConnection`] serializes every call.
pub trait Connection: Send {
    /// Opens the session.
    ///
    /// # Errors
    ///
    /// Returns [`S7Error::Connection`] if the device cannot be reached.
    fn connect(&mut self, endpoint: &Endpoint) -> Result<()>;

    /// Closes the session. Does nothing when already closed.
    fn disconnect(&mut self);

    /// Returns whether a session is open.
    fn is_connected(&self) -> bool;

    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`S7Error::Transport`] if the device refuses or the call fails.
    fn read_bytes(
        &mut self,
        area: MemoryArea,
        block: u16,
        offset: u32,
        len: usize,
    ) -> Result<Vec<u8>>;

    /// Writes `data` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`S7Error::Transport`] if the device refuses or the call fails.
    fn write_bytes(
        &mut self,
        area: MemoryArea,
        block: u16,
        offset: u32,
        data: &[u8],
    ) -> Result<()>;
}

/// Exclusive access to the connection for the duration of one lock.
///
/// Obtained through [`SharedConnection::with_locked`]; several calls made on
/// the same session cannot be interleaved with calls from other threads.
pub struct Session<'a> {
    conn: &'a mut dyn Connection,
}

impl Session<'_> {
    /// Reads `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` without touching the device when no session is
    /// open, or the transport's error.
    pub fn read_bytes(
        &mut self,
        area: MemoryArea,
        block: u16,
        offset: u32,
        len: usize,
    ) -> Result<Vec<u8>> {
        if !self.conn.is_connected() {
            return Err(S7Error::NotConnected);
        }
        let block = area.effective_block(block);
        trace!("read {area}{block} @{offset} len {len}");
        let bytes = self.conn.read_bytes(area, block, offset, len).inspect_err(|e| {
            warn!("read {area}{block} @{offset} len {len} failed: {e}");
        })?;
        if bytes.len() != len {
            return Err(S7Error::transport(format!(
                "read {area}{block} @{offset}: expected {len} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Writes `data`.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` without touching the device when no session is
    /// open, or the transport's error.
    pub fn write_bytes(
        &mut self,
        area: MemoryArea,
        block: u16,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        if !self.conn.is_connected() {
            return Err(S7Error::NotConnected);
        }
        let block = area.effective_block(block);
        trace!("write {area}{block} @{offset} len {}", data.len());
        self.conn
            .write_bytes(area, block, offset, data)
            .inspect_err(|e| warn!("write {area}{block} @{offset} failed: {e}"))
    }
}

/// Cloneable, lock-guarded handle to a single [`Connection`].
#[derive(Clone)]
pub struct SharedConnection {
    inner: Arc<Mutex<Box<dyn Connection>>>,
}

impl SharedConnection {
    /// Takes ownership of `conn`; from now on it is only reachable through handles.
    pub fn new(conn: impl Connection + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(conn))),
        }
    }

    /// Opens the session.
    ///
    /// # Errors
    ///
    /// Returns [`S7Error::Connection`] on failure; the handle stays disconnected.
    pub fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        let mut conn = self.inner.lock();
        conn.connect(endpoint)?;
        info!("connected to {endpoint}");
        Ok(())
    }

    /// Closes the session.
    pub fn disconnect(&self) {
        let mut conn = self.inner.lock();
        if conn.is_connected() {
            conn.disconnect();
            info!("disconnected");
        }
    }

    /// Returns whether a session is open.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().is_connected()
    }

    /// Runs `f` while holding the connection lock.
    ///
    /// Use this when a sequence of calls must not interleave with other
    /// callers, such as a read-modify-write of a shared byte.
    pub fn with_locked<R>(&self, f: impl FnOnce(&mut Session<'_>) -> R) -> R {
        let mut conn = self.inner.lock();
        let mut session = Session { conn: &mut **conn };
        f(&mut session)
    }

    /// Reads `len` bytes under the lock.
    ///
    /// # Errors
    ///
    /// See [`Session::read_bytes`].
    pub fn read_bytes(
        &self,
        area: MemoryArea,
        block: u16,
        offset: u32,
        len: usize,
    ) -> Result<Vec<u8>> {
        self.with_locked(|s| s.read_bytes(area, block, offset, len))
    }

    /// Writes `data` under the lock.
    ///
    /// # Errors
    ///
    /// See [`Session::write_bytes`].
    pub fn write_bytes(
        &self,
        area: MemoryArea,
        block: u16,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.with_locked(|s| s.write_bytes(area, block, offset, data))
    }
}

impl std::fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConnection")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatedPlc;
    use std::thread;

    fn connected(plc: &SimulatedPlc) -> SharedConnection {
        let conn = SharedConnection::new(plc.clone());
        conn.connect(&Endpoint::new("127.0.0.1", DEFAULT_RACK, DEFAULT_SLOT))
            .unwrap();
        conn
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(
            Endpoint::new("192.168.0.16", 0, 1).to_string(),
            "192.168.0.16 rack 0 slot 1"
        );
    }

    #[test]
    fn test_not_connected_never_reaches_device() {
        let plc = SimulatedPlc::new();
        let conn = SharedConnection::new(plc.clone());
        assert!(!conn.is_connected());
        assert!(matches!(
            conn.read_bytes(MemoryArea::Merker, 0, 0, 1),
            Err(S7Error::NotConnected)
        ));
        assert!(matches!(
            conn.write_bytes(MemoryArea::Merker, 0, 0, &[1]),
            Err(S7Error::NotConnected)
        ));
        assert_eq!(plc.call_count(), 0);
    }

    #[test]
    fn test_connect_refused() {
        let plc = SimulatedPlc::new();
        plc.refuse_connections(true);
        let conn = SharedConnection::new(plc);
        let err = conn.connect(&Endpoint::new("10.0.0.1", 0, 1)).unwrap_err();
        assert!(matches!(err, S7Error::Connection { .. }));
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_block_ignored_outside_data_blocks() {
        let plc = SimulatedPlc::new();
        let conn = connected(&plc);
        conn.write_bytes(MemoryArea::Output, 9, 4, &[0xAA]).unwrap();
        assert_eq!(plc.peek(MemoryArea::Output, 0, 4, 1), vec![0xAA]);
    }

    #[test]
    fn test_disconnect() {
        let plc = SimulatedPlc::new();
        let conn = connected(&plc);
        assert!(conn.is_connected());
        conn.disconnect();
        assert!(!conn.is_connected());
        conn.disconnect();
    }

    #[test]
    fn test_calls_are_serialized() {
        let plc = SimulatedPlc::new();
        plc.set_latency(std::time::Duration::from_millis(1));
        let conn = connected(&plc);

        let handles: Vec<_> = (0..4u32)
            .map(|i| {
                let conn = conn.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        conn.write_bytes(MemoryArea::DataBlock, 1, i, &[i as u8]).unwrap();
                        conn.read_bytes(MemoryArea::DataBlock, 1, i, 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(plc.call_count(), 80);
        assert!(!plc.overlap_detected());
    }
}
