//! Error kinds for eva-core, one per component boundary (§7 of the spec).

use thiserror::Error;

/// Raised when a [`crate::config::Tuning`] value is invalid. Fatal at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be non-negative, got {value}")]
    NegativeGain { field: &'static str, value: f32 },
    #[error("{field} out of range [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
}

/// Errors surfaced by the Tracker. Device and perception failures are
/// recovered locally by the Tracker itself and never reach this enum;
/// it only carries conditions that stop the tracking loop outright.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("robot controller call failed: {0}")]
    Device(String),
    #[error("tracker already running")]
    AlreadyRunning,
}

/// Transport/protocol failures from the duplex dialogue session (§7).
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("protocol error from dialogue service: {0}")]
    Protocol(String),
    #[error("not connected")]
    NotConnected,
    #[error("connection considered dead: no message for {0:?}")]
    Stale(std::time::Duration),
}

/// Audio Player failures (§4.6, §7 DeviceFailure).
#[derive(Debug, Error)]
pub enum AudioPlayerError {
    #[error("invalid base64 audio payload: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("sink write failed: {0}")]
    SinkWrite(String),
    #[error("flush timed out after {0:?}")]
    FlushTimeout(std::time::Duration),
}

/// A tool handler failure (§7 ToolFailure). Always rendered back to the
/// dialogue service as `Error: <message>`, never propagated further.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ToolError(pub String);

impl ToolError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
