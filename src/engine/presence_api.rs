use super::Engine;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    api::PresenceAPI,
    entities::{ConnectionId, Coordinates, DriverPresence, DriverStatus},
};

// A driver silent for this long is demoted to Offline, starting the grace
// window; an Offline driver older than the retention threshold is removed.
fn liveness_window() -> Duration {
    Duration::seconds(90)
}

fn offline_retention() -> Duration {
    Duration::minutes(5)
}

#[async_trait]
impl PresenceAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn register_driver(
        &self,
        driver_id: String,
        name: String,
        location: Coordinates,
        vehicle_type: String,
        connection: ConnectionId,
    ) {
        let presence = DriverPresence::new(driver_id.clone(), name, location, vehicle_type, connection);

        {
            let mut drivers = self.drivers.write().await;
            drivers.insert(driver_id, presence.clone());
        }

        self.publish_snapshot().await;
        self.record(&presence);
    }

    #[tracing::instrument(skip(self))]
    async fn update_location(&self, driver_id: &str, location: Coordinates) -> bool {
        let updated = {
            let mut drivers = self.drivers.write().await;

            match drivers.get_mut(driver_id) {
                Some(presence) => {
                    presence.location = location;
                    presence.is_online = true;
                    presence.last_update_at = Utc::now();
                    Some(presence.clone())
                }
                None => None,
            }
        };

        match updated {
            Some(presence) => {
                self.publish_snapshot().await;
                self.record(&presence);
                true
            }
            None => false,
        }
    }

    #[tracing::instrument(skip(self))]
    async fn heartbeat(&self, driver_id: &str) -> bool {
        let came_back_online = {
            let mut drivers = self.drivers.write().await;

            match drivers.get_mut(driver_id) {
                Some(presence) => {
                    let was_online = presence.is_online;
                    presence.is_online = true;
                    presence.last_update_at = Utc::now();
                    Some(!was_online)
                }
                None => None,
            }
        };

        match came_back_online {
            Some(true) => {
                self.publish_snapshot().await;
                true
            }
            Some(false) => true,
            None => false,
        }
    }

    #[tracing::instrument(skip(self))]
    async fn set_status(&self, driver_id: &str, status: DriverStatus) -> bool {
        let updated = {
            let mut drivers = self.drivers.write().await;

            match drivers.get_mut(driver_id) {
                Some(presence) => {
                    presence.status = status;
                    presence.is_online = status != DriverStatus::Offline;
                    presence.last_update_at = Utc::now();
                    Some(presence.clone())
                }
                None => None,
            }
        };

        match updated {
            Some(presence) => {
                self.publish_snapshot().await;
                self.record(&presence);
                true
            }
            None => false,
        }
    }

    /// Keeps the record for the grace window so a reconnect does not lose
    /// ride context. A close of a superseded connection is ignored.
    #[tracing::instrument(skip(self))]
    async fn mark_disconnected(&self, driver_id: &str, connection: ConnectionId) {
        let disconnected = {
            let mut drivers = self.drivers.write().await;

            match drivers.get_mut(driver_id) {
                Some(presence) if presence.connection == connection => {
                    presence.status = DriverStatus::Offline;
                    presence.is_online = false;
                    presence.last_update_at = Utc::now();
                    Some(presence.clone())
                }
                _ => None,
            }
        };

        if let Some(presence) = disconnected {
            self.publish_snapshot().await;
            self.record(&presence);
        }
    }

    async fn snapshot(&self) -> Vec<DriverPresence> {
        self.current_snapshot().await
    }

    #[tracing::instrument(skip(self))]
    async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut demoted = Vec::new();
        let mut removed = 0;

        {
            let mut drivers = self.drivers.write().await;

            for presence in drivers.values_mut() {
                if presence.is_online && now - presence.last_update_at > liveness_window() {
                    presence.status = DriverStatus::Offline;
                    presence.is_online = false;
                    demoted.push(presence.clone());
                }
            }

            drivers.retain(|_, presence| {
                if !presence.is_online && now - presence.last_update_at > offline_retention() {
                    tracing::info!(driver_id = %presence.driver_id, "removing inactive driver");
                    removed += 1;
                    return false;
                }

                true
            });
        }

        for presence in &demoted {
            self.record(presence);
        }

        if removed > 0 || !demoted.is_empty() {
            self.publish_snapshot().await;
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use crate::api::PresenceAPI;
    use crate::engine::testing;
    use crate::entities::{ConnectionId, Coordinates, DriverStatus};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn register_appears_once_in_snapshot() {
        let engine = testing::engine();

        engine
            .register_driver(
                "d1".into(),
                "Asha".into(),
                Coordinates::new(12.90, 77.59),
                "taxi".into(),
                ConnectionId::new(),
            )
            .await;

        let snapshot = engine.snapshot().await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].driver_id, "d1");
        assert!(snapshot[0].is_online);
        assert_eq!(snapshot[0].status, DriverStatus::Live);
    }

    #[tokio::test]
    async fn reregistration_replaces_prior_entry() {
        let engine = testing::engine();

        engine
            .register_driver(
                "d1".into(),
                "Asha".into(),
                Coordinates::new(12.90, 77.59),
                "taxi".into(),
                ConnectionId::new(),
            )
            .await;
        engine
            .register_driver(
                "d1".into(),
                "Asha".into(),
                Coordinates::new(12.95, 77.60),
                "taxi".into(),
                ConnectionId::new(),
            )
            .await;

        let snapshot = engine.snapshot().await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].location, Coordinates::new(12.95, 77.60));
    }

    #[tokio::test]
    async fn stale_close_does_not_clobber_replacement() {
        let engine = testing::engine();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        engine
            .register_driver(
                "d1".into(),
                "Asha".into(),
                Coordinates::new(12.90, 77.59),
                "taxi".into(),
                first,
            )
            .await;
        engine
            .register_driver(
                "d1".into(),
                "Asha".into(),
                Coordinates::new(12.90, 77.59),
                "taxi".into(),
                second,
            )
            .await;

        engine.mark_disconnected("d1", first).await;
        assert!(engine.snapshot().await[0].is_online);

        engine.mark_disconnected("d1", second).await;
        assert!(!engine.snapshot().await[0].is_online);
    }

    #[tokio::test]
    async fn unknown_driver_mutations_are_noops() {
        let engine = testing::engine();

        assert!(!engine.update_location("ghost", Coordinates::new(0.0, 0.0)).await);
        assert!(!engine.heartbeat("ghost").await);
        assert!(!engine.set_status("ghost", DriverStatus::Live).await);

        engine.mark_disconnected("ghost", ConnectionId::new()).await;
        assert!(engine.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn set_status_derives_is_online() {
        let engine = testing::engine();

        engine
            .register_driver(
                "d1".into(),
                "Asha".into(),
                Coordinates::new(12.90, 77.59),
                "taxi".into(),
                ConnectionId::new(),
            )
            .await;

        assert!(engine.set_status("d1", DriverStatus::Offline).await);
        let snapshot = engine.snapshot().await;
        assert!(!snapshot[0].is_online);

        assert!(engine.set_status("d1", DriverStatus::Live).await);
        assert!(engine.snapshot().await[0].is_online);
    }

    #[tokio::test]
    async fn sweep_removes_long_offline_drivers() {
        let engine = testing::engine();
        let connection = ConnectionId::new();

        engine
            .register_driver(
                "d1".into(),
                "Asha".into(),
                Coordinates::new(12.90, 77.59),
                "taxi".into(),
                connection,
            )
            .await;
        engine.mark_disconnected("d1", connection).await;

        let removed = engine.sweep(Utc::now() + Duration::minutes(6)).await;

        assert_eq!(removed, 1);
        assert!(engine.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn heartbeat_within_grace_window_retains_driver() {
        let engine = testing::engine();
        let connection = ConnectionId::new();

        engine
            .register_driver(
                "d1".into(),
                "Asha".into(),
                Coordinates::new(12.90, 77.59),
                "taxi".into(),
                connection,
            )
            .await;
        engine.mark_disconnected("d1", connection).await;

        assert!(engine.heartbeat("d1").await);

        let removed = engine.sweep(Utc::now()).await;

        assert_eq!(removed, 0);
        assert!(engine.snapshot().await[0].is_online);
    }

    #[tokio::test]
    async fn sweep_demotes_silent_live_drivers() {
        let engine = testing::engine();

        engine
            .register_driver(
                "d1".into(),
                "Asha".into(),
                Coordinates::new(12.90, 77.59),
                "taxi".into(),
                ConnectionId::new(),
            )
            .await;

        let removed = engine.sweep(Utc::now() + Duration::minutes(2)).await;

        assert_eq!(removed, 0);
        let snapshot = engine.snapshot().await;
        assert!(!snapshot[0].is_online);
        assert_eq!(snapshot[0].status, DriverStatus::Offline);
    }

    #[tokio::test]
    async fn presence_mutations_reach_the_store() {
        let (engine, store) = testing::engine_with_store();

        engine
            .register_driver(
                "d1".into(),
                "Asha".into(),
                Coordinates::new(12.90, 77.59),
                "taxi".into(),
                ConnectionId::new(),
            )
            .await;

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].driver_id, "d1");
        assert_eq!(records[0].status, "Live");
    }
}
