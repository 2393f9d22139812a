mod dispatch_api;
mod presence_api;
mod proximity_api;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::api::{EventAPI, API};
use crate::entities::{DriverPresence, RideRequest};
use crate::fanout::{Audience, Envelope, Event, Fanout};
use crate::store::{PresenceRecord, PresenceStore};

/// Owns the volatile driver and ride tables. Both are guarded by their own
/// lock, never held across I/O; operations touching both tables take
/// rides before drivers everywhere.
pub struct Engine {
    drivers: Arc<RwLock<HashMap<String, DriverPresence>>>,
    rides: Arc<RwLock<HashMap<String, RideRequest>>>,
    fanout: Fanout,
    store: Arc<dyn PresenceStore + Send + Sync>,
}

impl Engine {
    pub fn new(store: Arc<dyn PresenceStore + Send + Sync>) -> Self {
        Self {
            drivers: Arc::new(RwLock::new(HashMap::new())),
            rides: Arc::new(RwLock::new(HashMap::new())),
            fanout: Fanout::new(256),
            store,
        }
    }

    pub(crate) async fn current_snapshot(&self) -> Vec<DriverPresence> {
        let drivers = self.drivers.read().await;

        let mut snapshot: Vec<DriverPresence> = drivers.values().cloned().collect();
        snapshot.sort_by(|a, b| a.driver_id.cmp(&b.driver_id));

        snapshot
    }

    /// The broadcast carries the online set only; offline drivers riding out
    /// the grace window stay in the registry but not in the published view.
    pub(crate) async fn publish_snapshot(&self) {
        let drivers = self
            .current_snapshot()
            .await
            .into_iter()
            .filter(|presence| presence.is_online)
            .collect();

        self.fanout
            .publish(Audience::Everyone, Event::PresenceSnapshot { drivers });
    }

    /// Mirrors one presence mutation into the audit trail. The write happens
    /// on a background task; failures are logged and swallowed.
    pub(crate) fn record(&self, presence: &DriverPresence) {
        let record = PresenceRecord::from(presence);
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            if let Err(error) = store.record_presence(record).await {
                tracing::warn!(
                    code = error.code,
                    message = %error.message,
                    "failed to record presence"
                );
            }
        });
    }
}

impl EventAPI for Engine {
    fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.fanout.subscribe()
    }
}

impl API for Engine {}
