//! Error types for typed S7 access and the polling engine.

use std::io;
use thiserror::Error;

/// Result type alias for S7 operations.
pub type Result<T> = std::result::Result<T, S7Error>;

/// Why the registry refused to start a polling task.
///
/// A rejection never changes registry state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RejectReason {
    /// An active task already reads the same area/block/offset/bit/type.
    #[error("an identical task is already running as task {existing_id}")]
    DuplicateSignature {
        /// Id of the task holding the signature.
        existing_id: u8,
    },

    /// Every task slot is in use.
    #[error("at most {capacity} polling tasks may run at once")]
    CapacityExceeded {
        /// Configured number of task slots.
        capacity: usize,
    },

    /// Interval outside the accepted range.
    #[error("interval {interval_ms} ms is outside {min}..={max} ms")]
    InvalidInterval {
        /// Requested interval.
        interval_ms: u64,
        /// Smallest accepted interval.
        min: u64,
        /// Largest accepted interval.
        max: u64,
    },
}

/// Errors that can occur while talking to the PLC or managing tasks.
#[derive(Debug, Error)]
pub enum S7Error {
    /// Address text could not be parsed, or its bit part does not match the value type.
    #[error("Invalid address: {reason}")]
    AddressFormat {
        /// Description of the addressing error.
        reason: String,
    },

    /// A polling task was refused.
    #[error("Task rejected: {0}")]
    Rejected(#[from] RejectReason),

    /// Connecting to the PLC failed.
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection {
        /// Endpoint that was dialed.
        endpoint: String,
        /// Description of the failure.
        reason: String,
    },

    /// A single read or write call failed.
    #[error("Transport error: {reason}")]
    Transport {
        /// Description of the failure.
        reason: String,
    },

    /// An operation needed a live connection.
    #[error("PLC is not connected")]
    NotConnected,

    /// No active task carries the given id.
    #[error("No task with id {id}")]
    TaskNotFound {
        /// Requested task id.
        id: u8,
    },

    /// A stopped worker was asked to start again.
    #[error("Worker of task {id} has already stopped")]
    WorkerStopped {
        /// Task id of the worker.
        id: u8,
    },

    /// I/O error, e.g. when a worker thread cannot be spawned.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid parameter provided.
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },
}

impl S7Error {
    /// Creates a new `AddressFormat` error.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_poll::S7Error;
    ///
    /// let err = S7Error::address_format("bit offset must be 0-7");
    /// ```
    pub fn address_format(reason: impl Into<String>) -> Self {
        Self::AddressFormat {
            reason: reason.into(),
        }
    }

    /// Creates a new `Connection` error.
    pub fn connection(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `Transport` error.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_poll::S7Error;
    ///
    /// let err = S7Error::transport("read of DB1.DBB18 refused");
    /// ```
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidParameter` error.
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures of an individual read/write call.
    ///
    /// `NotConnected` counts as a transport failure: the call never reached the device.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_format_display() {
        let err = S7Error::address_format("bit offset must be 0-7");
        assert_eq!(err.to_string(), "Invalid address: bit offset must be 0-7");
    }

    #[test]
    fn test_rejected_display() {
        let err = S7Error::from(RejectReason::CapacityExceeded { capacity: 10 });
        assert_eq!(
            err.to_string(),
            "Task rejected: at most 10 polling tasks may run at once"
        );

        let err = S7Error::from(RejectReason::InvalidInterval {
            interval_ms: 0,
            min: 1,
            max: 100_000,
        });
        assert_eq!(
            err.to_string(),
            "Task rejected: interval 0 ms is outside 1..=100000 ms"
        );
    }

    #[test]
    fn test_connection_display() {
        let err = S7Error::connection("192.168.0.16 rack 0 slot 1", "refused");
        assert_eq!(
            err.to_string(),
            "Connection to 192.168.0.16 rack 0 slot 1 failed: refused"
        );
    }

    #[test]
    fn test_is_transport() {
        assert!(S7Error::transport("x").is_transport());
        assert!(S7Error::NotConnected.is_transport());
        assert!(!S7Error::address_format("x").is_transport());
        assert!(!S7Error::TaskNotFound { id: 3 }.is_transport());
    }
}
