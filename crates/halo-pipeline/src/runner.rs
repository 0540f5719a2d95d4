//! The analysis loop: telemetry in, classified rows out.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use halo_core::HaloConfig;
use halo_telemetry::{spawn_poller, PollerStats, TelemetryConsumer};

use crate::error::Result;
use crate::logger::ResponseLogger;
use crate::processor::{frame_for_transfer, ResponseProcessor};

/// Blocks buffered between the poller and the analysis loop.
const BLOCK_QUEUE_CAPACITY: usize = 8;

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Blocks received from telemetry
    pub blocks: u64,
    /// Responses returned by the processor
    pub responses: u64,
    /// Rows persisted
    pub rows_logged: u64,
    /// Blocks the processor failed on
    pub processor_errors: u64,
    /// Classified responses that could not be persisted
    pub storage_errors: u64,
    /// Poller counters
    pub poller: PollerStats,
}

/// Wires a telemetry consumer, a response processor and a logger.
pub struct AnalysisPipeline<P> {
    consumer: TelemetryConsumer,
    processor: P,
    logger: ResponseLogger,
    poll_interval: Duration,
}

impl<P: ResponseProcessor + 'static> AnalysisPipeline<P> {
    /// Pipeline from explicit parts.
    pub fn new(
        consumer: TelemetryConsumer,
        processor: P,
        logger: ResponseLogger,
        poll_interval: Duration,
    ) -> Self {
        Self {
            consumer,
            processor,
            logger,
            poll_interval,
        }
    }

    /// Pipeline for a validated configuration. Fails if the telemetry
    /// segment is not published yet.
    pub fn from_config(config: &HaloConfig, processor: P) -> Result<Self> {
        config.validate()?;
        let consumer = TelemetryConsumer::open(&config.telemetry.segment_path)?;
        let logger = ResponseLogger::from_config(config)?;
        Ok(Self::new(
            consumer,
            processor,
            logger,
            Duration::from_millis(config.telemetry.poll_interval_ms.max(1)),
        ))
    }

    /// Run until `shutdown` turns true, its sender is dropped, or the
    /// segment is retired. Every open partition is closed before returning.
    ///
    /// Processor and store failures are logged and counted; the loop keeps
    /// going.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<PipelineStats> {
        let Self {
            consumer,
            mut processor,
            mut logger,
            poll_interval,
        } = self;
        let mut stats = PipelineStats::default();

        info!(
            segment = %consumer.path().display(),
            store = %logger.partitions().root().display(),
            "Analysis pipeline started"
        );
        let (poller, mut blocks) = spawn_poller(consumer, poll_interval, BLOCK_QUEUE_CAPACITY);

        loop {
            if *shutdown.borrow() {
                break;
            }
            let block = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                block = blocks.recv() => match block {
                    Some(block) => block,
                    None => break,
                },
            };
            stats.blocks += 1;

            let waveform = block.waveform();
            let response = match processor.process(&frame_for_transfer(&waveform)).await {
                Ok(response) => response,
                Err(e) => {
                    stats.processor_errors += 1;
                    warn!(error = %e, timestamp = block.timestamp, "Processor failed, skipping block");
                    continue;
                }
            };
            stats.responses += 1;

            // Appends fsync every row
            let (returned, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = logger.analyze(&waveform, &response);
                (logger, outcome)
            })
            .await?;
            logger = returned;
            match outcome {
                Ok(_) => stats.rows_logged += 1,
                Err(_) => stats.storage_errors += 1,
            }
        }

        drop(blocks);
        stats.poller = poller.await?;
        tokio::task::spawn_blocking(move || logger.close()).await??;

        info!(
            blocks = stats.blocks,
            rows = stats.rows_logged,
            processor_errors = stats.processor_errors,
            storage_errors = stats.storage_errors,
            "Analysis pipeline stopped"
        );
        Ok(stats)
    }
}
