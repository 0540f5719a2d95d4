//! Async polling of a telemetry segment.
//!
//! The poller owns a [`TelemetryConsumer`] and forwards fresh blocks through
//! a bounded channel. A slow receiver never slows the poll loop: when the
//! channel is full the block is dropped and counted.

use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::consumer::{BlockRead, TelemetryBlock, TelemetryConsumer};

/// Counters reported when the poller stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Blocks handed to the receiver
    pub delivered: u64,
    /// Blocks dropped because the receiver lagged
    pub dropped: u64,
}

/// Spawn a task polling `consumer` every `interval`.
///
/// The task ends when the segment is retired or the receiver is dropped,
/// returning its counters.
pub fn spawn_poller(
    mut consumer: TelemetryConsumer,
    interval: Duration,
    capacity: usize,
) -> (JoinHandle<PollerStats>, mpsc::Receiver<TelemetryBlock>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let handle = tokio::spawn(async move {
        let mut stats = PollerStats::default();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if tx.is_closed() {
                debug!("Telemetry receiver dropped, stopping poller");
                break;
            }

            match read_block(&mut consumer) {
                BlockRead::Fresh(block) => match tx.try_send(block) {
                    Ok(()) => stats.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(block)) => {
                        stats.dropped += 1;
                        debug!(timestamp = block.timestamp, "Receiver lagging, dropped block");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                },
                BlockRead::NoNewData => {}
                BlockRead::Unavailable => {
                    info!(
                        path = %consumer.path().display(),
                        "Telemetry segment retired, stopping poller"
                    );
                    break;
                }
            }
        }

        stats
    });

    (handle, rx)
}

/// A producer that died mid-publish keeps the read in its retry loop for
/// up to its full budget, so on a multi-threaded runtime the worker is
/// handed off first.
fn read_block(consumer: &mut TelemetryConsumer) -> BlockRead {
    match Handle::current().runtime_flavor() {
        RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| consumer.read_latest_block()),
        _ => consumer.read_latest_block(),
    }
}
