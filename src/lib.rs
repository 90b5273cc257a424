//! # S7 Typed Access and Polling Library
//!
//! A Rust library for typed reads and writes against Siemens S7 PLC memory,
//! plus a bounded engine of periodic polling tasks sharing one connection.
//!
//! The device transport itself is pluggable: anything implementing
//! [`Connection`] works. [`SimulatedPlc`] ships in-memory for demos and tests.
//!
//! ## Features
//!
//! - **Typed marshalling**: `Bool`, `Int16`, `Float32`, `FixedString`, `Char`
//!   with bit-exact S7 wire formats (big-endian, `[max][len][payload]` strings)
//! - **Operator addresses**: `"18"` and `"1.7"` parsed with type-aware checks
//! - **Bounded polling**: up to 10 tasks by default, one thread each,
//!   duplicate and interval checks, smallest-free-id reuse
//! - **Serialized device access**: every call from every thread goes
//!   through one lock; bit writes are read-modify-write under that lock
//! - **No panics**: all errors returned as `Result<T, S7Error>`
//!
//! ## Quick Start
//!
//! ```
//! use s7_poll::{Client, ClientConfig, MemoryArea, SimulatedPlc, Value, ValueType};
//! use std::time::Duration;
//!
//! fn main() -> s7_poll::Result<()> {
//!     let (client, mut events) = Client::with_aggregator(
//!         SimulatedPlc::new(),
//!         ClientConfig::new("192.168.0.16"),
//!     )?;
//!     client.connect()?;
//!
//!     // DB1.DBW18
//!     client.write_value(MemoryArea::DataBlock, 1, "18", ValueType::Int16, &Value::Int16(42))?;
//!     let value = client.read_value(MemoryArea::DataBlock, 1, "18", ValueType::Int16)?;
//!     println!("DB1.DBW18 = {value}");
//!
//!     // M1.7
//!     client.write_value(MemoryArea::Merker, 0, "1.7", ValueType::Bool, &Value::Bool(true))?;
//!
//!     // Poll DB1.DBW18 every 10 ms
//!     let task = client.add_task(MemoryArea::DataBlock, 1, "18", ValueType::Int16, 10)?;
//!     while let Some(event) = events.next_event(Duration::from_millis(100)) {
//!         println!("{event}");
//!         if events.execution_count(task.id) >= Some(3) {
//!             break;
//!         }
//!     }
//!
//!     client.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! ## Memory Areas
//!
//! | Area | Short name | Area code | Block number |
//! |------|:----------:|:---------:|:------------:|
//! | [`MemoryArea::DataBlock`] | `DB` | `0x84` | ✓ |
//! | [`MemoryArea::Input`] | `I` | `0x81` | ✗ (0) |
//! | [`MemoryArea::Output`] | `Q` | `0x82` | ✗ (0) |
//! | [`MemoryArea::Merker`] | `M` | `0x83` | ✗ (0) |
//!
//! ## Polling
//!
//! A task is identified by its [`AcquisitionSignature`] (area, block, byte,
//! bit, type); the interval is not part of it. Each tick performs one read
//! and reports a [`TaskEvent::Tick`]. A failed read is reported like any
//! other tick, carrying the type's default value, and still increments the
//! execution count. One-shot reads, by contrast, always return the error.
//!
//! ## Utility Functions
//!
//! ```
//! use s7_poll::utils::{get_bit, set_bit, format_binary, format_hex};
//!
//! let value: u8 = 0b1000_0001;
//! assert!(get_bit(value, 7));
//! assert_eq!(set_bit(value, 7, false), 0b0000_0001);
//! assert_eq!(format_binary(value), "0b1000_0001");
//! assert_eq!(format_hex(&[0x14, 0x05]), "14 05");
//! ```
//!
//! ## Error Handling
//!
//! ```
//! use s7_poll::{Client, ClientConfig, MemoryArea, RejectReason, S7Error, SimulatedPlc, ValueType};
//!
//! let (client, _events) = Client::with_aggregator(SimulatedPlc::new(), ClientConfig::new("plc"))?;
//! client.connect()?;
//! client.add_task(MemoryArea::Input, 0, "4", ValueType::Int16, 500)?;
//!
//! match client.add_task(MemoryArea::Input, 0, "4", ValueType::Int16, 1000) {
//!     Err(S7Error::Rejected(RejectReason::DuplicateSignature { existing_id })) => {
//!         println!("already polled by task {existing_id}");
//!     }
//!     Err(S7Error::AddressFormat { reason }) => println!("bad address: {reason}"),
//!     Err(e) => println!("Error: {e}"),
//!     Ok(task) => println!("{task}"),
//! }
//! # Ok::<(), S7Error>(())
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod address;
mod client;
mod connection;
mod error;
mod events;
mod marshal;
mod memory;
mod registry;
mod simulator;
mod task;
pub mod utils;
pub mod value;
mod worker;

// Public re-exports
pub use address::{Address, MAX_BIT};
pub use client::{Client, ClientConfig};
pub use connection::{
    Connection, Endpoint, Session, SharedConnection, DEFAULT_RACK, DEFAULT_SLOT,
};
pub use error::{RejectReason, Result, S7Error};
pub use events::{ResultAggregator, TaskEvent, DEFAULT_LOG_LIMIT};
pub use marshal::{Marshaller, Reading};
pub use memory::MemoryArea;
pub use registry::{
    TaskLimits, TaskRegistry, DEFAULT_MAX_INTERVAL_MS, DEFAULT_MAX_TASKS, MIN_INTERVAL_MS,
};
pub use simulator::SimulatedPlc;
pub use task::{AcquisitionSignature, Task};
pub use value::{Value, ValueType, DEFAULT_STRING_LEN, MAX_STRING_LEN};
pub use worker::{TaskWorker, WorkerState};
