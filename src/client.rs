//! High-level S7 client combining one-shot access and polling tasks.
//!
//! This module provides the [`Client`] struct, the interactive entry point:
//! it owns the shared connection, the task registry and the event sender.
//!
//! # Overview
//!
//! The client provides:
//! - Connection lifecycle (`connect`/`disconnect`; disconnecting tears every
//!   polling task down first)
//! - One-shot typed reads and writes from operator address text (`"18"`, `"1.7"`)
//! - Polling task management on top of [`TaskRegistry`]
//!
//! # Example
//!
//! ```
//! use s7_poll::{Client, ClientConfig, MemoryArea, SimulatedPlc, Value, ValueType};
//!
//! let (client, mut aggregator) = Client::with_aggregator(
//!     SimulatedPlc::new(),
//!     ClientConfig::new("192.168.0.16"),
//! )?;
//! client.connect()?;
//!
//! client.write_value(MemoryArea::DataBlock, 1, "18", ValueType::Int16, &Value::Int16(42))?;
//! let value = client.read_value(MemoryArea::DataBlock, 1, "18", ValueType::Int16)?;
//! assert_eq!(value, Value::Int16(42));
//!
//! let task = client.add_task(MemoryArea::DataBlock, 1, "18", ValueType::Int16, 100)?;
//! client.remove_task(task.id)?;
//!
//! client.disconnect();
//! aggregator.drain();
//! # Ok::<(), s7_poll::S7Error>(())
//! ```
//!
//! # Configuration
//!
//! [`ClientConfig`] carries the endpoint (host, rack, slot), the task
//! admission limits and the default declared length of string values.

use std::sync::mpsc::Sender;

use log::warn;
use parking_lot::Mutex;

use crate::address::Address;
use crate::connection::{Connection, Endpoint, SharedConnection, DEFAULT_RACK, DEFAULT_SLOT};
use crate::error::{S7Error, Result};
use crate::events::{ResultAggregator, TaskEvent};
use crate::marshal::Marshaller;
use crate::memory::MemoryArea;
use crate::registry::{TaskLimits, TaskRegistry};
use crate::task::{AcquisitionSignature, Task};
use crate::value::{Value, ValueType, DEFAULT_STRING_LEN, MAX_STRING_LEN};

/// Configuration for creating an S7 client.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientConfig {
    /// PLC endpoint.
    pub endpoint: Endpoint,
    /// Admission limits for polling tasks.
    pub limits: TaskLimits,
    /// Declared length of string values when none is given.
    pub string_len: u8,
}

impl ClientConfig {
    /// Creates a configuration with rack 0, slot 1, ten task slots, intervals
    /// of 1 to 100000 ms and 20-character strings.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_poll::ClientConfig;
    ///
    /// let config = ClientConfig::new("192.168.0.16");
    /// assert_eq!(config.endpoint.slot, 1);
    /// assert_eq!(config.limits.max_tasks, 10);
    /// ```
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::new(host, DEFAULT_RACK, DEFAULT_SLOT),
            limits: TaskLimits::default(),
            string_len: DEFAULT_STRING_LEN,
        }
    }

    /// Sets the CPU rack (default is 0).
    pub fn with_rack(mut self, rack: u16) -> Self {
        self.endpoint.rack = rack;
        self
    }

    /// Sets the CPU slot (default is 1).
    ///
    /// # Example
    ///
    /// ```
    /// use s7_poll::ClientConfig;
    ///
    /// let config = ClientConfig::new("192.168.0.16").with_rack(0).with_slot(2);
    /// assert_eq!(config.endpoint.to_string(), "192.168.0.16 rack 0 slot 2");
    /// ```
    pub fn with_slot(mut self, slot: u16) -> Self {
        self.endpoint.slot = slot;
        self
    }

    /// Sets the number of task slots (default is 10).
    pub fn with_max_tasks(mut self, max_tasks: u8) -> Self {
        self.limits.max_tasks = max_tasks;
        self
    }

    /// Sets the largest accepted polling interval (default is 100000 ms).
    pub fn with_max_interval(mut self, max_interval_ms: u64) -> Self {
        self.limits.max_interval_ms = max_interval_ms;
        self
    }

    /// Sets the default declared string length (default is 20).
    pub fn with_string_len(mut self, string_len: u8) -> Self {
        self.string_len = string_len;
        self
    }

    fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        if self.string_len > MAX_STRING_LEN {
            return Err(S7Error::invalid_parameter(
                "string_len",
                format!("S7 strings hold at most {MAX_STRING_LEN} characters"),
            ));
        }
        Ok(())
    }
}

/// S7 client: one-shot typed access plus bounded polling.
///
/// Every call into the device, from this client or from any polling worker,
/// goes through the same lock-guarded connection.
///
/// `connect`, `disconnect` and `add_task` are serialized against each other:
/// once `disconnect` returns, no task added concurrently is left running.
pub struct Client {
    config: ClientConfig,
    marshaller: Marshaller,
    registry: TaskRegistry,
    lifecycle: Mutex<()>,
}

impl Client {
    /// Creates a disconnected client that reports task events on `events`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an unusable configuration.
    pub fn new(
        conn: impl Connection + 'static,
        config: ClientConfig,
        events: Sender<TaskEvent>,
    ) -> Result<Self> {
        config.validate()?;
        let marshaller = Marshaller::new(SharedConnection::new(conn));
        let registry = TaskRegistry::new(marshaller.clone(), events, config.limits)?;
        Ok(Self {
            config,
            marshaller,
            registry,
            lifecycle: Mutex::new(()),
        })
    }

    /// Creates a client together with the aggregator consuming its events.
    ///
    /// # Errors
    ///
    /// See [`Client::new`].
    pub fn with_aggregator(
        conn: impl Connection + 'static,
        config: ClientConfig,
    ) -> Result<(Self, ResultAggregator)> {
        let (tx, aggregator) = ResultAggregator::channel();
        Ok((Self::new(conn, config, tx)?, aggregator))
    }

    /// Connects to the configured endpoint. Does nothing if already connected.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the device cannot be reached.
    pub fn connect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        let conn = self.marshaller.connection();
        if conn.is_connected() {
            warn!("already connected to {}", self.config.endpoint);
            return Ok(());
        }
        conn.connect(&self.config.endpoint)
    }

    /// Stops every polling task, then closes the connection.
    pub fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.registry.teardown_all();
        self.marshaller.connection().disconnect();
    }

    /// Returns whether the connection is open.
    pub fn is_connected(&self) -> bool {
        self.marshaller.connection().is_connected()
    }

    /// Reads a value at operator address text such as `"18"` or `"1.7"`.
    ///
    /// # Errors
    ///
    /// `AddressFormat` if the text does not match the type (checked before
    /// any device call), otherwise the transport error.
    pub fn read_value(
        &self,
        area: MemoryArea,
        block: u16,
        address: &str,
        ty: ValueType,
    ) -> Result<Value> {
        let address = Address::parse(address, ty.is_bit_addressed())?;
        self.marshaller.read(area, block, address, ty)
    }

    /// Writes a value at operator address text.
    ///
    /// # Errors
    ///
    /// `AddressFormat`, `InvalidParameter` for a value the type cannot carry,
    /// or the transport error.
    pub fn write_value(
        &self,
        area: MemoryArea,
        block: u16,
        address: &str,
        ty: ValueType,
        value: &Value,
    ) -> Result<()> {
        let address = Address::parse(address, ty.is_bit_addressed())?;
        self.marshaller.write(area, block, address, ty, value)
    }

    /// String type with the configured declared length.
    pub fn string_type(&self) -> ValueType {
        ValueType::FixedString {
            max_len: self.config.string_len,
        }
    }

    /// Resolves an operator type name, giving strings the configured length.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for unknown names.
    pub fn value_type(&self, name: &str) -> Result<ValueType> {
        ValueType::from_name(name, self.config.string_len)
    }

    /// Starts a polling task reading `ty` at `address` every `interval_ms`.
    ///
    /// # Errors
    ///
    /// `NotConnected`, `AddressFormat`, or `Rejected` with the registry's reason.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_poll::{Client, ClientConfig, MemoryArea, S7Error, SimulatedPlc, ValueType};
    ///
    /// let (client, _events) =
    ///     Client::with_aggregator(SimulatedPlc::new(), ClientConfig::new("plc"))?;
    /// assert!(matches!(
    ///     client.add_task(MemoryArea::Merker, 0, "1.7", ValueType::Bool, 100),
    ///     Err(S7Error::NotConnected)
    /// ));
    ///
    /// client.connect()?;
    /// let task = client.add_task(MemoryArea::Merker, 0, "1.7", ValueType::Bool, 100)?;
    /// assert_eq!(
    ///     task.to_string(),
    ///     "[Task 1] area M start 1.7 type bool interval 100ms executed 0"
    /// );
    /// # Ok::<(), S7Error>(())
    /// ```
    pub fn add_task(
        &self,
        area: MemoryArea,
        block: u16,
        address: &str,
        ty: ValueType,
        interval_ms: u64,
    ) -> Result<Task> {
        let _lifecycle = self.lifecycle.lock();
        if !self.is_connected() {
            return Err(S7Error::NotConnected);
        }
        let address = Address::parse(address, ty.is_bit_addressed())?;
        let signature = AcquisitionSignature::new(area, block, address, ty)?;
        self.registry.add_task(signature, interval_ms)
    }

    /// Stops and removes a polling task.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` if no active task has this id.
    pub fn remove_task(&self, id: u8) -> Result<Task> {
        self.registry.remove_task(id)
    }

    /// Snapshot of active tasks in id order.
    pub fn tasks(&self) -> Vec<Task> {
        self.registry.tasks()
    }

    /// The task registry.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Typed access sharing this client's connection.
    pub fn marshaller(&self) -> &Marshaller {
        &self.marshaller
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.config.endpoint)
            .field("connected", &self.is_connected())
            .field("tasks", &self.registry.len())
            .finish()
    }
}
