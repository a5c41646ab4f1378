use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use shared::domain::{hsv_pairs, ParameterPair, ParameterValue};
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    commit::{CommitReceipt, CommitWorkflow},
    constraint::{lock_engine, CalibrationView, ConstraintEngine, EditOutcome, SharedEngine},
    dispatcher::ConflatingDispatcher,
    error::{CommitError, EngineError, SessionError},
    refresh::VisualRefreshPipeline,
    sync::{RemoteStateSynchronizer, SeedReport},
    transport::{HttpRemoteAuthority, RemoteAuthority},
    TunerEvent, EVENT_CHANNEL_CAPACITY,
};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub pairs: Vec<ParameterPair>,
    pub pending_name: Option<String>,
    pub artifact_dir: Option<PathBuf>,
    pub request_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            pairs: hsv_pairs(),
            pending_name: None,
            artifact_dir: None,
            request_timeout: None,
        }
    }
}

/// One operator's calibration session against one server.
pub struct CalibrationSession {
    engine: SharedEngine,
    dispatcher: Arc<ConflatingDispatcher>,
    refresher: Arc<VisualRefreshPipeline>,
    synchronizer: RemoteStateSynchronizer,
    commits: CommitWorkflow,
    events: broadcast::Sender<TunerEvent>,
}

impl CalibrationSession {
    pub fn connect(server_url: &str, options: SessionOptions) -> Result<Self, SessionError> {
        let remote = HttpRemoteAuthority::new(server_url, options.request_timeout)?;
        info!(server_url = remote.server_url(), "calibration session configured");
        Self::with_authority(Arc::new(remote), options)
    }

    pub fn with_authority(
        remote: Arc<dyn RemoteAuthority>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mut engine = ConstraintEngine::new(options.pairs)?;
        if let Some(name) = &options.pending_name {
            engine.set_pending_name(name);
        }
        let engine = Arc::new(Mutex::new(engine));

        let refresher = Arc::new(VisualRefreshPipeline::new(
            Arc::clone(&remote),
            options.artifact_dir,
            events.clone(),
        ));
        let dispatcher = ConflatingDispatcher::new(
            Arc::clone(&remote),
            refresher.clone(),
            events.clone(),
        )?;

        Ok(Self {
            synchronizer: RemoteStateSynchronizer::new(
                Arc::clone(&remote),
                Arc::clone(&engine),
                events.clone(),
            ),
            commits: CommitWorkflow::new(remote, Arc::clone(&engine), events.clone()),
            engine,
            dispatcher,
            refresher,
            events,
        })
    }

    /// Seeds from the server, then shows the current images. Neither step is
    /// fatal.
    pub async fn start(&self) -> Option<SeedReport> {
        let report = self.synchronizer.seed().await;
        self.refresher.refresh_now().await;
        report
    }

    /// Handles one edit event: reconciles the pair, then queues every changed
    /// value for delivery.
    pub fn edit(&self, key: &str, value: ParameterValue) -> Result<EditOutcome, EngineError> {
        let outcome = lock_engine(&self.engine).apply_edit(key, value)?;
        for (key, value) in outcome.writes() {
            self.dispatcher.submit(key, value);
        }
        Ok(outcome)
    }

    pub fn set_pending_name(&self, name: &str) {
        lock_engine(&self.engine).set_pending_name(name);
    }

    pub fn value(&self, key: &str) -> Option<ParameterValue> {
        lock_engine(&self.engine).value(key)
    }

    pub fn view(&self) -> CalibrationView {
        lock_engine(&self.engine).view()
    }

    pub fn pairs(&self) -> Vec<ParameterPair> {
        lock_engine(&self.engine).pairs().to_vec()
    }

    pub async fn commit(&self, name: &str) -> Result<CommitReceipt, CommitError> {
        self.commits.submit(name).await
    }

    pub async fn flush(&self) {
        self.dispatcher.flush().await;
    }

    pub fn dispatcher(&self) -> &Arc<ConflatingDispatcher> {
        &self.dispatcher
    }

    pub fn refresher(&self) -> &Arc<VisualRefreshPipeline> {
        &self.refresher
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TunerEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
