//! Drives the pipeline on a fixed period and on manual triggers.
//!
//! At most one cycle runs at a time across both sources. A trigger that finds a
//! cycle in flight is skipped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::IngestionPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started,
    /// Another cycle holds the run gate.
    Skipped,
    ShuttingDown,
}

#[derive(Clone)]
pub struct IngestScheduler {
    pipeline: Arc<IngestionPipeline>,
    gate: Arc<Mutex<()>>,
    stopping: Arc<AtomicBool>,
}

impl IngestScheduler {
    pub fn new(pipeline: Arc<IngestionPipeline>) -> Self {
        Self {
            pipeline,
            gate: Arc::new(Mutex::new(())),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts a cycle in the background if none is running. Returns immediately.
    pub fn trigger(&self) -> TriggerOutcome {
        if self.stopping.load(Ordering::SeqCst) {
            return TriggerOutcome::ShuttingDown;
        }
        let Ok(guard) = self.gate.clone().try_lock_owned() else {
            debug!("Ingestion cycle still in flight, skipping trigger");
            return TriggerOutcome::Skipped;
        };

        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            let _guard = guard;
            pipeline.run_cycle().await;
        });
        TriggerOutcome::Started
    }

    /// Ticks every `period` until `shutdown` flips to true (or its sender is
    /// dropped), then waits for the in-flight cycle to finish.
    pub async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Mailbox polling every {}s", period.as_secs_f64());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.trigger();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.stopping.store(true, Ordering::SeqCst);
        info!("Scheduler stopping, waiting for in-flight cycle");
        let _idle = self.gate.lock().await;
        info!("Scheduler stopped");
    }
}
