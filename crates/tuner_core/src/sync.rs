use std::sync::Arc;

use shared::protocol::SnapshotBody;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    constraint::{lock_engine, SharedEngine},
    transport::RemoteAuthority,
    TunerEvent,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub applied: usize,
    pub ignored: Vec<String>,
}

/// Seeds local state from the authority's snapshot. Read-only: nothing seeded
/// here is ever written back.
pub struct RemoteStateSynchronizer {
    remote: Arc<dyn RemoteAuthority>,
    engine: SharedEngine,
    events: broadcast::Sender<TunerEvent>,
}

impl RemoteStateSynchronizer {
    pub fn new(
        remote: Arc<dyn RemoteAuthority>,
        engine: SharedEngine,
        events: broadcast::Sender<TunerEvent>,
    ) -> Self {
        Self {
            remote,
            engine,
            events,
        }
    }

    /// Returns `None` when the snapshot could not be read; local defaults are
    /// kept in that case.
    pub async fn seed(&self) -> Option<SeedReport> {
        match self.remote.fetch_snapshot().await {
            Ok(snapshot) => {
                let report = self.apply(snapshot);
                info!(
                    applied = report.applied,
                    ignored = report.ignored.len(),
                    "seeded parameters from server"
                );
                let _ = self.events.send(TunerEvent::Seeded(report.clone()));
                Some(report)
            }
            Err(error) => {
                warn!(error = %format!("{error:#}"), "failed to load parameter snapshot; keeping defaults");
                let _ = self.events.send(TunerEvent::SeedFailed(format!("{error:#}")));
                None
            }
        }
    }

    pub fn apply(&self, snapshot: SnapshotBody) -> SeedReport {
        let mut entries = snapshot.into_iter().collect::<Vec<_>>();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut report = SeedReport::default();
        let mut engine = lock_engine(&self.engine);
        for (key, raw) in entries {
            let applied = raw
                .as_parameter_value()
                .is_some_and(|value| engine.apply_remote(&key, value));
            if applied {
                report.applied += 1;
            } else {
                debug!(key = %key, value = ?raw, "ignoring snapshot entry");
                report.ignored.push(key);
            }
        }
        engine.refresh_snippet();
        report
    }
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
