//! Classification of neural-processor responses.
//!
//! The processor returns an opaque byte buffer whose meaning depends on the
//! active processing topology. [`ResponseClassifier`] turns that buffer into
//! a [`ClassificationRecord`](halo_core::ClassificationRecord): a test-pattern
//! check first, then a variance-based activity estimate compared against the
//! configured thresholds.

pub mod decoder;
pub mod metrics;

pub use decoder::ResponseClassifier;
