//! Response processors: whatever turns a waveform into a response buffer.

use async_trait::async_trait;

use crate::error::Result;

/// Largest transfer the processing hardware accepts, in bytes.
pub const MAX_TRANSFER_BYTES: usize = 16384;

/// Transfers are padded to a multiple of this many bytes.
pub const TRANSFER_ALIGNMENT: usize = 16;

/// Sends a waveform for processing and returns the processed response.
#[async_trait]
pub trait ResponseProcessor: Send {
    /// Process one framed waveform.
    async fn process(&mut self, waveform: &[u8]) -> Result<Vec<u8>>;
}

/// Echoes every waveform back unchanged. For dry runs without processing
/// hardware.
#[derive(Debug, Default, Clone)]
pub struct LoopbackProcessor {
    transfers: u64,
}

impl LoopbackProcessor {
    /// New loopback processor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waveforms processed so far.
    pub fn transfers(&self) -> u64 {
        self.transfers
    }
}

#[async_trait]
impl ResponseProcessor for LoopbackProcessor {
    async fn process(&mut self, waveform: &[u8]) -> Result<Vec<u8>> {
        self.transfers += 1;
        Ok(waveform.to_vec())
    }
}

/// Zero-pad `waveform` to the transfer alignment and cap it at
/// [`MAX_TRANSFER_BYTES`].
pub fn frame_for_transfer(waveform: &[u8]) -> Vec<u8> {
    let padded = waveform.len().div_ceil(TRANSFER_ALIGNMENT) * TRANSFER_ALIGNMENT;
    let mut framed = waveform.to_vec();
    framed.resize(padded.min(MAX_TRANSFER_BYTES), 0);
    framed
}
