use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Pool, Postgres};
use tokio::sync::Mutex;

use crate::entities::DriverPresence;
use crate::error::Error;

/// Immutable audit entry mirroring one presence mutation.
#[derive(Clone, Debug)]
pub struct PresenceRecord {
    pub driver_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub vehicle_type: String,
    pub status: String,
    pub recorded_at: DateTime<Utc>,
}

impl From<&DriverPresence> for PresenceRecord {
    fn from(presence: &DriverPresence) -> Self {
        Self {
            driver_id: presence.driver_id.clone(),
            name: presence.name.clone(),
            latitude: presence.location.latitude,
            longitude: presence.location.longitude,
            vehicle_type: presence.vehicle_type.clone(),
            status: presence.status.name().into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Write-behind presence trail. Callers issue the write from a background
/// task and never wait on it; failures are logged and swallowed.
#[async_trait]
pub trait PresenceStore {
    async fn record_presence(&self, record: PresenceRecord) -> Result<(), Error>;
}

#[derive(Debug)]
pub struct PgPresenceStore {
    pool: Pool<Postgres>,
}

impl PgPresenceStore {
    #[tracing::instrument(name = "PgPresenceStore::new", skip_all)]
    pub async fn new(pool: Pool<Postgres>) -> Result<Self, Error> {
        pool.execute(
            "CREATE TABLE IF NOT EXISTS driver_presence_log (
                id BIGSERIAL PRIMARY KEY,
                driver_id VARCHAR NOT NULL,
                name VARCHAR NOT NULL,
                latitude DOUBLE PRECISION NOT NULL,
                longitude DOUBLE PRECISION NOT NULL,
                vehicle_type VARCHAR NOT NULL,
                status VARCHAR NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL
            )",
        )
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl PresenceStore for PgPresenceStore {
    async fn record_presence(&self, record: PresenceRecord) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query(
                "INSERT INTO driver_presence_log
                    (driver_id, name, latitude, longitude, vehicle_type, status, recorded_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&record.driver_id)
            .bind(&record.name)
            .bind(record.latitude)
            .bind(record.longitude)
            .bind(&record.vehicle_type)
            .bind(&record.status)
            .bind(record.recorded_at),
        )
        .await?;

        Ok(())
    }
}

/// In-process store for tests and database-less runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PresenceRecord>>,
}

impl MemoryStore {
    pub async fn records(&self) -> Vec<PresenceRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn record_presence(&self, record: PresenceRecord) -> Result<(), Error> {
        self.records.lock().await.push(record);

        Ok(())
    }
}
