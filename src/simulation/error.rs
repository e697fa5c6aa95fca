//! Error types and handling
//!
//! This module contains the error taxonomy of the simulation engine: fatal
//! configuration and ordering errors, the transient empty-queue condition, and
//! the locally recovered handler and flush errors.

use thiserror::Error;

use crate::types::ConfigError;

/// Errors that can occur during simulation
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Scenario configuration is malformed or incomplete
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Virtual time was asked to run backward
    #[error("Ordering violation: cannot move virtual time from {current} back to {attempted}")]
    OrderingViolation {
        /// Time the clock was asked to move to
        attempted: f64,
        /// Time the clock was at
        current: f64,
    },

    /// No event is pending
    #[error("Event queue is empty")]
    EmptyQueue,

    /// An event action failed
    #[error("Event handler failed: {0}")]
    Handler(#[from] HandlerError),

    /// The output collaborator failed to flush
    #[error("Flush failed: {0}")]
    Flush(#[from] FlushError),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimulationError {
    /// Create an ordering violation error
    pub fn ordering_violation(attempted: f64, current: f64) -> Self {
        Self::OrderingViolation { attempted, current }
    }

    /// Check if the run can continue after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            SimulationError::Config(_) => false,
            SimulationError::OrderingViolation { .. } => false,
            SimulationError::EmptyQueue => true,
            SimulationError::Handler(_) => true,
            SimulationError::Flush(_) => true,
            SimulationError::Io(_) => false,
            SimulationError::Serialization(_) => false,
        }
    }

    /// Get the error category
    pub fn category(&self) -> &'static str {
        match self {
            SimulationError::Config(_) => "Configuration",
            SimulationError::OrderingViolation { .. } => "Ordering",
            SimulationError::EmptyQueue => "Queue",
            SimulationError::Handler(_) => "Handler",
            SimulationError::Flush(_) => "Flush",
            SimulationError::Io(_) => "IO",
            SimulationError::Serialization(_) => "Serialization",
        }
    }
}

/// Result type for simulation operations
pub type SimulationResult<T> = Result<T, SimulationError>;

/// Errors raised by event actions
///
/// These never abort a run. The scheduler logs them and moves on to the next
/// event.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload does not reference a registered device
    #[error("no device registered at index {0}")]
    UnknownDevice(usize),

    /// An external payload named a device that does not exist
    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    /// The payload did not match what the action expects
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A follow-up event was scheduled before the current virtual time
    #[error("cannot schedule an event at {attempted} before current time {current}")]
    ScheduleInPast {
        /// Requested event time
        attempted: f64,
        /// Current virtual time
        current: f64,
    },

    /// Any other failure
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Create a malformed payload error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }

    /// Create a generic failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Errors raised by the output collaborator
#[derive(Debug, Error)]
pub enum FlushError {
    /// Writing the batch failed
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the batch failed
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The backend refused the batch
    #[error("backend rejected batch: {0}")]
    Rejected(String),
}
