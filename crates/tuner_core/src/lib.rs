//! Live-update synchronisation between an operator's range controls and the
//! calibration server.

use shared::{domain::ParameterValue, protocol::ArtifactKind};

pub mod cache_buster;
pub mod commit;
pub mod constraint;
pub mod dispatcher;
pub mod error;
pub mod refresh;
pub mod session;
pub mod sync;
pub mod transport;

pub use commit::{CommitReceipt, CommitWorkflow};
pub use constraint::{CalibrationView, ConstraintEngine, EditOutcome};
pub use dispatcher::{ConflatingDispatcher, Submission};
pub use error::{CommitError, EngineError, SessionError};
pub use refresh::{ArtifactFrame, RefreshReport, RefreshTrigger, VisualRefreshPipeline};
pub use session::{CalibrationSession, SessionOptions};
pub use sync::{RemoteStateSynchronizer, SeedReport};
pub use transport::{HttpRemoteAuthority, RemoteAuthority};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Progress of a session, published on the broadcast channel returned by
/// [`CalibrationSession::subscribe_events`].
#[derive(Debug, Clone)]
pub enum TunerEvent {
    Seeded(SeedReport),
    SeedFailed(String),
    Delivered {
        key: String,
        value: ParameterValue,
    },
    /// The write was dropped; a newer edit for the key may still follow.
    DeliveryFailed {
        key: String,
        value: ParameterValue,
        reason: String,
    },
    ArtifactRefreshed {
        kind: ArtifactKind,
        token: u64,
        size_bytes: usize,
    },
    /// Fetching one image failed; the displayed frame is kept.
    RefreshFailed {
        kind: ArtifactKind,
        token: u64,
        reason: String,
    },
    Committed(CommitReceipt),
    CommitFailed(String),
}

#[cfg(test)]
pub(crate) mod test_support;
