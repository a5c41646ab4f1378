use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::domain::{validate_configuration_name, NamedConfiguration};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::{
    constraint::{lock_engine, SharedEngine},
    error::CommitError,
    transport::RemoteAuthority,
    TunerEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub configuration: NamedConfiguration,
    pub committed_at: DateTime<Utc>,
}

/// Persists the current bounds under an operator-chosen name.
///
/// Reads local state directly; pending dispatcher writes are not awaited.
/// Overlapping submissions are sent as independent requests.
pub struct CommitWorkflow {
    remote: Arc<dyn RemoteAuthority>,
    engine: SharedEngine,
    events: broadcast::Sender<TunerEvent>,
}

impl CommitWorkflow {
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

    pub async fn submit(&self, raw_name: &str) -> Result<CommitReceipt, CommitError> {
        let name = validate_configuration_name(raw_name)?;
        let configuration = {
            let engine = lock_engine(&self.engine);
            NamedConfiguration::capture(name, engine.pairs(), engine.state())
        };

        if let Err(error) = self.remote.commit(name).await {
            error!(configuration = name, error = %format!("{error:#}"), "configuration submit failed");
            let _ = self
                .events
                .send(TunerEvent::CommitFailed(format!("{error:#}")));
            return Err(CommitError::Remote(error));
        }

        info!(configuration = name, "configuration saved");
        let receipt = CommitReceipt {
            configuration,
            committed_at: Utc::now(),
        };
        let _ = self.events.send(TunerEvent::Committed(receipt.clone()));
        Ok(receipt)
    }
}

#[cfg(test)]
#[path = "tests/commit_tests.rs"]
mod tests;
