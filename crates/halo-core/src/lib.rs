//! Core types shared by every stage of the HALO telemetry pipeline.
//!
//! This crate holds the vocabulary the other crates agree on:
//!
//! - [`classification`]: response types, processing topologies and the
//!   classification record produced for every processor response
//! - [`thresholds`]: the confidence/activity threshold policy shared by the
//!   live classifier and the archive reader
//! - [`units`]: ADC code, microvolt and waveform byte transforms
//! - [`config`]: figment-backed configuration
//! - [`logging`]: tracing subscriber setup
//! - [`error`]: the core error type

pub mod classification;
pub mod config;
pub mod error;
pub mod logging;
pub mod thresholds;
pub mod units;

pub use classification::{ClassificationRecord, Pipeline, PipelineProfile, ResponseType};
pub use config::HaloConfig;
pub use error::{HaloError, Result};
pub use thresholds::{classify_levels, Thresholds};
