use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::domain::ParameterValue;
use tokio::{
    runtime::Handle,
    sync::{broadcast, watch},
};
use tracing::{debug, warn};

use crate::{
    error::SessionError, refresh::RefreshTrigger, transport::RemoteAuthority, TunerEvent,
};

/// Conflation slot for one parameter key.
#[derive(Debug, Default)]
struct PendingDelivery {
    latest_value: Option<ParameterValue>,
    in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// No delivery was running for the key; one has been spawned.
    Started,
    /// A delivery is already running and will pick the value up.
    Conflated,
}

/// Delivers parameter writes with at most one request in flight per key.
///
/// Each key owns a single slot holding the newest undelivered value. A burst
/// of submissions overwrites that slot, so intermediate values may never be
/// sent, but the last one always is. Keys are delivered independently.
pub struct ConflatingDispatcher {
    remote: Arc<dyn RemoteAuthority>,
    refresher: Arc<dyn RefreshTrigger>,
    runtime: Handle,
    pending: Mutex<HashMap<String, PendingDelivery>>,
    active_loops: watch::Sender<usize>,
    events: broadcast::Sender<TunerEvent>,
}

impl ConflatingDispatcher {
    pub fn new(
        remote: Arc<dyn RemoteAuthority>,
        refresher: Arc<dyn RefreshTrigger>,
        events: broadcast::Sender<TunerEvent>,
    ) -> Result<Arc<Self>, SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        Ok(Self::with_runtime(runtime, remote, refresher, events))
    }

    pub fn with_runtime(
        runtime: Handle,
        remote: Arc<dyn RemoteAuthority>,
        refresher: Arc<dyn RefreshTrigger>,
        events: broadcast::Sender<TunerEvent>,
    ) -> Arc<Self> {
        let (active_loops, _) = watch::channel(0);
        Arc::new(Self {
            remote,
            refresher,
            runtime,
            pending: Mutex::new(HashMap::new()),
            active_loops,
            events,
        })
    }

    /// Records `value` as the newest candidate for `key`. Never blocks on the
    /// network.
    pub fn submit(self: &Arc<Self>, key: &str, value: ParameterValue) -> Submission {
        let start = {
            let mut pending = self.lock_pending();
            let slot = pending.entry(key.to_string()).or_default();
            slot.latest_value = Some(value);
            if slot.in_flight {
                false
            } else {
                slot.in_flight = true;
                self.active_loops.send_modify(|active| *active += 1);
                true
            }
        };

        if !start {
            debug!(key, value, "conflated into running delivery");
            return Submission::Conflated;
        }

        let dispatcher = Arc::clone(self);
        let key = key.to_string();
        self.runtime.spawn(async move {
            dispatcher.drain(key).await;
        });
        Submission::Started
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.lock_pending()
            .get(key)
            .is_some_and(|slot| slot.in_flight)
    }

    pub fn pending_value(&self, key: &str) -> Option<ParameterValue> {
        self.lock_pending()
            .get(key)
            .and_then(|slot| slot.latest_value)
    }

    pub fn active_deliveries(&self) -> usize {
        *self.active_loops.borrow()
    }

    /// Waits until every key has drained.
    pub async fn flush(&self) {
        let mut active = self.active_loops.subscribe();
        let _ = active.wait_for(|count| *count == 0).await;
    }

    async fn drain(self: Arc<Self>, key: String) {
        while let Some(value) = self.take_latest(&key) {
            match self.remote.write_parameter(&key, value).await {
                Ok(()) => {
                    debug!(key = %key, value, "parameter delivered");
                    let _ = self.events.send(TunerEvent::Delivered {
                        key: key.clone(),
                        value,
                    });
                    self.refresher.refresh().await;
                }
                Err(error) => {
                    // Not retried: a newer edit, if any, is picked up below.
                    warn!(key = %key, value, error = %format!("{error:#}"), "parameter delivery failed");
                    let _ = self.events.send(TunerEvent::DeliveryFailed {
                        key: key.clone(),
                        value,
                        reason: format!("{error:#}"),
                    });
                }
            }
        }
    }

    /// Takes the newest value, or releases the key's loop when there is none.
    /// Both happen under one lock so a concurrent submit either lands before
    /// the take or finds the loop released and starts a new one.
    fn take_latest(&self, key: &str) -> Option<ParameterValue> {
        let mut pending = self.lock_pending();
        let next = pending.get_mut(key).and_then(|slot| {
            let next = slot.latest_value.take();
            if next.is_none() {
                slot.in_flight = false;
            }
            next
        });
        if next.is_none() {
            self.active_loops
                .send_modify(|active| *active = active.saturating_sub(1));
        }
        next
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, PendingDelivery>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
