//! Error types for the analysis pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by the analysis pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] halo_core::HaloError),

    /// Telemetry segment error
    #[error(transparent)]
    Telemetry(#[from] halo_telemetry::TelemetryError),

    /// Partition store error
    #[error(transparent)]
    Storage(#[from] halo_storage::StorageError),

    /// The response processor failed to return a response
    #[error("Response processor failed: {0}")]
    Processor(String),

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
