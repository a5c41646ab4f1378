use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::ParameterValue,
    protocol::{ArtifactKind, SnapshotBody, SnapshotValue},
};
use tokio::sync::{mpsc, Mutex, Semaphore};

use crate::{refresh::RefreshTrigger, transport::RemoteAuthority};

/// In-process authority with call logs, scripted failures and an optional
/// gate that holds every write until a permit is released.
pub(crate) struct FakeAuthority {
    pub snapshot: Mutex<Option<SnapshotBody>>,
    pub writes: Mutex<Vec<(String, ParameterValue)>>,
    pub artifact_fetches: Mutex<Vec<(ArtifactKind, u64)>>,
    pub commits: Mutex<Vec<String>>,
    pub failing_values: Mutex<HashSet<ParameterValue>>,
    pub fail_artifacts: AtomicBool,
    pub fail_commits: AtomicBool,
    in_flight: Mutex<HashMap<String, usize>>,
    pub max_in_flight_per_key: Mutex<HashMap<String, usize>>,
    in_flight_total: AtomicUsize,
    pub max_in_flight_total: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    entered: mpsc::UnboundedSender<(String, ParameterValue)>,
}

impl FakeAuthority {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, ParameterValue)>) {
        Self::build(None)
    }

    pub fn gated() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, ParameterValue)>) {
        Self::build(Some(Arc::new(Semaphore::new(0))))
    }

    fn build(
        gate: Option<Arc<Semaphore>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<(String, ParameterValue)>) {
        let (entered, entered_rx) = mpsc::unbounded_channel();
        let fake = Arc::new(Self {
            snapshot: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            artifact_fetches: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            failing_values: Mutex::new(HashSet::new()),
            fail_artifacts: AtomicBool::new(false),
            fail_commits: AtomicBool::new(false),
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight_per_key: Mutex::new(HashMap::new()),
            in_flight_total: AtomicUsize::new(0),
            max_in_flight_total: AtomicUsize::new(0),
            gate,
            entered,
        });
        (fake, entered_rx)
    }

    pub async fn with_snapshot(self: Arc<Self>, entries: &[(&str, i64)]) -> Arc<Self> {
        let body = entries
            .iter()
            .map(|(key, value)| (key.to_string(), SnapshotValue::Integer(*value)))
            .collect();
        *self.snapshot.lock().await = Some(body);
        self
    }

    /// Lets `count` gated writes complete.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    pub async fn written(&self) -> Vec<(String, ParameterValue)> {
        self.writes.lock().await.clone()
    }

    pub async fn max_in_flight(&self, key: &str) -> usize {
        self.max_in_flight_per_key
            .lock()
            .await
            .get(key)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteAuthority for FakeAuthority {
    async fn fetch_snapshot(&self) -> Result<SnapshotBody> {
        self.snapshot
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("snapshot unavailable: 503 Service Unavailable"))
    }

    async fn write_parameter(&self, key: &str, value: ParameterValue) -> Result<()> {
        self.writes.lock().await.push((key.to_string(), value));
        {
            let mut in_flight = self.in_flight.lock().await;
            let count = in_flight.entry(key.to_string()).or_default();
            *count += 1;
            let mut max = self.max_in_flight_per_key.lock().await;
            let max = max.entry(key.to_string()).or_default();
            *max = (*max).max(*count);
        }
        let total = self.in_flight_total.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_total.fetch_max(total, Ordering::SeqCst);
        let _ = self.entered.send((key.to_string(), value));

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        self.in_flight_total.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.in_flight.lock().await.get_mut(key) {
            *count -= 1;
        }

        if self.failing_values.lock().await.contains(&value) {
            return Err(anyhow!("update {key}={value} rejected: 500 Internal Server Error"));
        }
        Ok(())
    }

    async fn fetch_artifact(&self, kind: ArtifactKind, token: u64) -> Result<Vec<u8>> {
        self.artifact_fetches.lock().await.push((kind, token));
        if self.fail_artifacts.load(Ordering::SeqCst) {
            return Err(anyhow!("{} image unavailable", kind.file_stem()));
        }
        Ok(format!("{}:{token}", kind.file_stem()).into_bytes())
    }

    async fn commit(&self, name: &str) -> Result<()> {
        self.commits.lock().await.push(name.to_string());
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(anyhow!("configuration submit rejected: 500 Internal Server Error"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct CountingRefresher {
    pub count: AtomicUsize,
}

impl CountingRefresher {
    pub fn refreshes(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshTrigger for CountingRefresher {
    async fn refresh(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
