use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use shared::protocol::ArtifactKind;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{cache_buster::CacheBuster, transport::RemoteAuthority, TunerEvent};

/// Hook fired by the dispatcher after every accepted write.
#[async_trait]
pub trait RefreshTrigger: Send + Sync {
    async fn refresh(&self);
}

#[derive(Debug, Clone)]
pub struct ArtifactFrame {
    pub token: u64,
    pub bytes: Arc<[u8]>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub token: u64,
    pub refreshed: Vec<ArtifactKind>,
    /// Fetched fine, but a newer refresh already landed.
    pub superseded: Vec<ArtifactKind>,
    pub failed: Vec<ArtifactKind>,
}

pub struct VisualRefreshPipeline {
    remote: Arc<dyn RemoteAuthority>,
    cache_buster: CacheBuster,
    frames: RwLock<HashMap<ArtifactKind, ArtifactFrame>>,
    artifact_dir: Option<PathBuf>,
    attempts: AtomicU64,
    events: broadcast::Sender<TunerEvent>,
}

impl VisualRefreshPipeline {
    pub fn new(
        remote: Arc<dyn RemoteAuthority>,
        artifact_dir: Option<PathBuf>,
        events: broadcast::Sender<TunerEvent>,
    ) -> Self {
        Self {
            remote,
            cache_buster: CacheBuster::new(),
            frames: RwLock::new(HashMap::new()),
            artifact_dir,
            attempts: AtomicU64::new(0),
            events,
        }
    }

    /// Re-fetches every artifact under one fresh cache-buster token.
    pub async fn refresh_now(&self) -> RefreshReport {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let token = self.cache_buster.next();
        let fetches = ArtifactKind::ALL.into_iter().map(|kind| async move {
            (kind, self.remote.fetch_artifact(kind, token).await)
        });

        let mut report = RefreshReport {
            token,
            ..RefreshReport::default()
        };
        for (kind, result) in join_all(fetches).await {
            match result {
                Ok(bytes) => {
                    let size_bytes = bytes.len();
                    let Some(frame) = self.store(kind, token, bytes) else {
                        debug!(artifact = kind.file_stem(), token, "dropping superseded image");
                        report.superseded.push(kind);
                        continue;
                    };
                    self.persist(kind, &frame).await;
                    report.refreshed.push(kind);
                    let _ = self.events.send(TunerEvent::ArtifactRefreshed {
                        kind,
                        token,
                        size_bytes,
                    });
                }
                Err(error) => {
                    warn!(artifact = kind.file_stem(), token, error = %format!("{error:#}"), "image refresh failed");
                    report.failed.push(kind);
                    let _ = self.events.send(TunerEvent::RefreshFailed {
                        kind,
                        token,
                        reason: format!("{error:#}"),
                    });
                }
            }
        }
        report
    }

    pub fn frame(&self, kind: ArtifactKind) -> Option<ArtifactFrame> {
        self.frames
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Keeps `bytes` unless a frame from a newer token is already shown.
    fn store(&self, kind: ArtifactKind, token: u64, bytes: Vec<u8>) -> Option<ArtifactFrame> {
        let mut frames = self.frames.write().unwrap_or_else(PoisonError::into_inner);
        if frames.get(&kind).is_some_and(|current| current.token > token) {
            return None;
        }
        let frame = ArtifactFrame {
            token,
            bytes: Arc::from(bytes),
            fetched_at: Utc::now(),
        };
        frames.insert(kind, frame.clone());
        Some(frame)
    }

    async fn persist(&self, kind: ArtifactKind, frame: &ArtifactFrame) {
        let Some(dir) = &self.artifact_dir else {
            return;
        };
        let path = dir.join(format!("{}.png", kind.file_stem()));
        let result = match tokio::fs::create_dir_all(dir).await {
            Ok(()) => tokio::fs::write(&path, &frame.bytes).await,
            Err(error) => Err(error),
        };
        if let Err(error) = result {
            warn!(path = %path.display(), %error, "failed to write image");
        }
    }
}

#[async_trait]
impl RefreshTrigger for VisualRefreshPipeline {
    async fn refresh(&self) {
        self.refresh_now().await;
    }
}

#[cfg(test)]
#[path = "tests/refresh_tests.rs"]
mod tests;
