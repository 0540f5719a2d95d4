//! Analysis pipeline.
//!
//! Polls the telemetry segment, sends each block's waveform to a
//! [`ResponseProcessor`], classifies the response and appends a row to the
//! current hour's partition:
//!
//! ```text
//! TelemetryConsumer ─▶ poller ─▶ frame_for_transfer ─▶ ResponseProcessor
//!                                                          │
//!            HourlyPartitions ◀─ FrameLayout ◀─ ResponseClassifier
//! ```
//!
//! Each stage degrades on its own: a failed processor call skips one block,
//! a failed append drops one row, and acquisition is never blocked.

pub mod error;
pub mod logger;
pub mod processor;
pub mod runner;

pub use error::{PipelineError, Result};
pub use logger::ResponseLogger;
pub use processor::{frame_for_transfer, LoopbackProcessor, ResponseProcessor};
pub use runner::{AnalysisPipeline, PipelineStats};
