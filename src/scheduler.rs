use crate::collectors::{Collector, MetricsSource};
use crate::report::Reporter;
use crate::store::{RecordId, SnapshotStore};
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};

/// What one cycle managed to do. Persisting and reporting are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub record_id: Option<RecordId>,
    pub reported: bool,
}

/// Drives collect, persist, report, sleep. Cycles never overlap and a slow
/// cycle is not compensated for.
pub struct Scheduler<S> {
    collector: Collector<S>,
    store: SnapshotStore,
    reporter: Reporter,
    interval: Duration,
    cycles: u64,
}

impl<S: MetricsSource> Scheduler<S> {
    pub fn new(
        collector: Collector<S>,
        store: SnapshotStore,
        reporter: Reporter,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            store,
            reporter,
            interval,
            cycles: 0,
        }
    }

    pub async fn run(mut self) {
        loop {
            self.tick().await;
            debug!(sleep_secs = self.interval.as_secs(), "sleeping");
            tokio::time::sleep(self.interval).await;
        }
    }

    pub async fn tick(&mut self) -> CycleOutcome {
        self.cycles += 1;
        let span = info_span!("cycle", n = self.cycles);
        self.run_cycle().instrument(span).await
    }

    async fn run_cycle(&mut self) -> CycleOutcome {
        debug!("collecting");
        // Blocks for the CPU sampling window; nothing else runs on this task meanwhile.
        let snapshot = self.collector.collect();
        debug!(
            storage = snapshot.storage.len(),
            gpu = snapshot.has_gpu_reading(),
            "snapshot collected"
        );

        debug!("persisting");
        let record_id = match self.store.append(&snapshot) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "failed to persist snapshot");
                None
            }
        };

        debug!("reporting");
        let reported = match self.reporter.send(&snapshot).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, url = %self.reporter.endpoint(), "failed to report snapshot");
                false
            }
        };

        CycleOutcome {
            record_id,
            reported,
        }
    }
}
