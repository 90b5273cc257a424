//! In-memory PLC for demos and tests.
//!
//! [`SimulatedPlc`] implements [`Connection`] against a byte map per
//! (area, block). Memory is zero-filled and grows on write. Clones share the
//! same device, so a test can keep one handle to inspect memory and inject
//! faults while another is owned by a [`SharedConnection`](crate::SharedConnection).
//!
//! Behavior switches:
//! - `refuse_connections(true)` → `connect` fails with `S7Error::Connection`
//! - `fail_reads(true)` / `fail_writes(true)` → calls fail with `S7Error::Transport`
//! - `set_latency(d)` → every call sleeps `d`, widening the window in which
//!   overlapping calls would be detected
//!
//! The device records whether two calls were ever in flight at the same time
//! ([`SimulatedPlc::overlap_detected`]); a real transport would corrupt the
//! exchange in that case.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::connection::{Connection, Endpoint};
use crate::error::{S7Error, Result};
use crate::memory::MemoryArea;

#[derive(Debug, Default)]
struct DeviceState {
    connected: bool,
    refuse: bool,
    fail_reads: bool,
    fail_writes: bool,
    latency: Duration,
    memory: HashMap<(MemoryArea, u16), Vec<u8>>,
}

impl DeviceState {
    fn region(&mut self, area: MemoryArea, block: u16, end: usize) -> &mut Vec<u8> {
        let region = self.memory.entry((area, block)).or_default();
        if region.len() < end {
            region.resize(end, 0);
        }
        region
    }
}

/// Simulated S7 device.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPlc {
    state: Arc<Mutex<DeviceState>>,
    in_flight: Arc<AtomicBool>,
    overlap: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

/// Marks a call as in flight until dropped.
struct CallGuard<'a> {
    in_flight: &'a AtomicBool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

impl SimulatedPlc {
    /// Creates a disconnected device with empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `connect` calls fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Makes subsequent reads fail.
    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// Makes subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Adds a fixed delay to every read and write.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Stores bytes directly, bypassing the connection (and its fault switches).
    pub fn poke(&self, area: MemoryArea, block: u16, offset: u32, data: &[u8]) {
        let start = offset as usize;
        let mut state = self.state.lock();
        let region = state.region(area, block, start + data.len());
        region[start..start + data.len()].copy_from_slice(data);
    }

    /// Loads bytes directly, bypassing the connection. Unwritten bytes read as 0.
    pub fn peek(&self, area: MemoryArea, block: u16, offset: u32, len: usize) -> Vec<u8> {
        let start = offset as usize;
        let state = self.state.lock();
        let mut out = vec![0u8; len];
        if let Some(region) = state.memory.get(&(area, block)) {
            for (i, slot) in out.iter_mut().enumerate() {
                if let Some(b) = region.get(start + i) {
                    *slot = *b;
                }
            }
        }
        out
    }

    /// Number of read/write calls that reached the device.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns `true` if two calls were ever in flight at once.
    pub fn overlap_detected(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    fn enter(&self) -> CallGuard<'_> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        CallGuard {
            in_flight: &self.in_flight,
        }
    }

    fn pause(&self) {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            thread::sleep(latency);
        }
    }
}

impl Connection for SimulatedPlc {
    fn connect(&mut self, endpoint: &Endpoint) -> Result<()> {
        let mut state = self.state.lock();
        if state.refuse {
            state.connected = false;
            return Err(S7Error::connection(endpoint.to_string(), "connection refused"));
        }
        state.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state.lock().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn read_bytes(
        &mut self,
        area: MemoryArea,
        block: u16,
        offset: u32,
        len: usize,
    ) -> Result<Vec<u8>> {
        let _guard = self.enter();
        self.pause();

        if self.state.lock().fail_reads {
            return Err(S7Error::transport(format!(
                "device refused read of {area}{block} @{offset}"
            )));
        }
        Ok(self.peek(area, block, offset, len))
    }

    fn write_bytes(
        &mut self,
        area: MemoryArea,
        block: u16,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        let _guard = self.enter();
        self.pause();

        if self.state.lock().fail_writes {
            return Err(S7Error::transport(format!(
                "device refused write of {area}{block} @{offset}"
            )));
        }
        self.poke(area, block, offset, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online() -> SimulatedPlc {
        let mut plc = SimulatedPlc::new();
        plc.connect(&Endpoint::new("sim", 0, 1)).unwrap();
        plc
    }

    #[test]
    fn test_unwritten_memory_reads_zero() {
        let mut plc = online();
        assert_eq!(plc.read_bytes(MemoryArea::Input, 0, 100, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_write_then_read() {
        let mut plc = online();
        plc.write_bytes(MemoryArea::DataBlock, 3, 10, &[1, 2, 3]).unwrap();
        assert_eq!(plc.read_bytes(MemoryArea::DataBlock, 3, 9, 5).unwrap(), vec![0, 1, 2, 3, 0]);
        // other blocks are separate
        assert_eq!(plc.peek(MemoryArea::DataBlock, 4, 10, 3), vec![0, 0, 0]);
        assert_eq!(plc.call_count(), 2);
    }

    #[test]
    fn test_fault_injection() {
        let mut plc = online();
        plc.fail_reads(true);
        assert!(plc.read_bytes(MemoryArea::Merker, 0, 0, 1).unwrap_err().is_transport());
        plc.fail_reads(false);
        plc.fail_writes(true);
        assert!(plc.write_bytes(MemoryArea::Merker, 0, 0, &[1]).is_err());
        assert_eq!(plc.peek(MemoryArea::Merker, 0, 0, 1), vec![0]);
    }

    #[test]
    fn test_refuse_connections() {
        let mut plc = SimulatedPlc::new();
        plc.refuse_connections(true);
        assert!(plc.connect(&Endpoint::new("sim", 0, 1)).is_err());
        assert!(!plc.is_connected());
    }

    #[test]
    fn test_clones_share_device() {
        let plc = online();
        let other = plc.clone();
        plc.poke(MemoryArea::Output, 0, 2, &[0x5A]);
        assert_eq!(other.peek(MemoryArea::Output, 0, 2, 1), vec![0x5A]);
        assert!(other.is_connected());
    }

    #[test]
    fn test_overlap_detection() {
        let plc = SimulatedPlc::new();
        let first = plc.enter();
        assert!(!plc.overlap_detected());
        let second = plc.enter();
        assert!(plc.overlap_detected());
        drop(second);
        drop(first);
    }
}
