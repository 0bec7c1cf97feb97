//! Pipeline context and task entry points
//!
//! One explicitly owned object wires the pieces together; there are no
//! process-wide singletons. The producer task holds a clone of the buffer
//! handle and appends; the sender task owns the pipeline and calls
//! [`TelemetryPipeline::tick`] once per send interval.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::buffer::{AppendOutcome, ReadingBuffer};
use crate::delivery::{Channel, Connectivity, DeliveryEngine, DeliveryOutcome};
use crate::errors::{BufferError, ChannelError};
use crate::power::SleepScheduler;
use crate::reading::Reading;
use crate::storage::BlobStore;
use crate::time::Timestamp;

/// What the sender task should do with the rest of this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleAction {
    /// Enter deep sleep for the given duration instead of sending
    Sleep(Duration),
    /// A send cycle ran to completion with this outcome
    Completed(DeliveryOutcome),
}

/// Owned context for the two pipeline tasks
pub struct TelemetryPipeline<N: Connectivity, C: Channel, S: BlobStore> {
    buffer: Arc<ReadingBuffer>,
    engine: DeliveryEngine<N, C, S>,
    scheduler: SleepScheduler,
}

impl<N: Connectivity, C: Channel, S: BlobStore> TelemetryPipeline<N, C, S> {
    /// Assemble the pipeline; logs what survived the previous session
    pub fn new(
        buffer: Arc<ReadingBuffer>,
        engine: DeliveryEngine<N, C, S>,
        scheduler: SleepScheduler,
    ) -> Self {
        engine.store().open_and_report();
        Self {
            buffer,
            engine,
            scheduler,
        }
    }

    /// Shared buffer handle for the producer task
    pub fn buffer(&self) -> Arc<ReadingBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Producer entry point: append one sampled value
    pub fn record(&self, value: f32, now: Timestamp) -> Result<AppendOutcome, BufferError> {
        self.buffer.append(Reading::new(now, value))
    }

    /// Sender entry point: decide between sleeping and running a send cycle
    pub fn tick(&mut self, now: Timestamp) -> CycleAction {
        let decision = self.scheduler.should_sleep(now);
        if decision.should_sleep {
            info!(
                "entering deep sleep for {} minutes",
                decision.duration.as_secs() / 60
            );
            return CycleAction::Sleep(decision.duration);
        }

        CycleAction::Completed(self.engine.run_send_cycle(&self.buffer, now))
    }

    /// Report the boot status (wake reason + battery) through the channel
    pub fn report_boot_status(&mut self, now: Timestamp, text: &str) -> Result<(), ChannelError> {
        self.engine.send_boot_status(now, text)
    }

    /// The delivery engine, for inspection
    pub fn engine(&self) -> &DeliveryEngine<N, C, S> {
        &self.engine
    }
}
