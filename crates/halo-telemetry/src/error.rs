//! Error types for the telemetry channel.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors that can occur when creating, attaching to or publishing into a
/// telemetry segment.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The producer could not create, size or map the segment
    #[error("Failed to create telemetry segment '{}': {source}", path.display())]
    SegmentCreateFailed {
        /// Backing file path
        path: PathBuf,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// The consumer could not open or map the segment
    #[error("Telemetry segment '{}' is unavailable: {source}", path.display())]
    SegmentUnavailable {
        /// Backing file path
        path: PathBuf,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// The segment exists but is not (or no longer) a live telemetry segment
    #[error("Telemetry segment '{}' has magic 0x{found:08X}, expected 0x{expected:08X}", path.display())]
    InvalidMagic {
        /// Backing file path
        path: PathBuf,
        /// Magic found in the header
        found: u32,
        /// Magic of a live segment
        expected: u32,
    },

    /// The header describes more data than the segment holds
    #[error("Telemetry segment '{}' is {len} bytes, header requires {required}", path.display())]
    SegmentTooSmall {
        /// Backing file path
        path: PathBuf,
        /// Actual length
        len: u64,
        /// Length implied by the header
        required: u64,
    },

    /// Header fields are inconsistent with each other
    #[error("Corrupt telemetry header in '{}': {reason}", path.display())]
    CorruptHeader {
        /// Backing file path
        path: PathBuf,
        /// What is inconsistent
        reason: String,
    },

    /// Requested geometry cannot be represented
    #[error("Invalid segment geometry: {0}")]
    InvalidGeometry(String),

    /// A published block does not match the segment geometry
    #[error("Block has {found} {dimension}, segment expects {expected}")]
    BlockShape {
        /// Which dimension mismatched (streams, channels, samples)
        dimension: &'static str,
        /// Size fixed at creation
        expected: usize,
        /// Size supplied by the caller
        found: usize,
    },

    /// I/O error while retiring a segment
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
