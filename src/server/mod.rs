mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Extension, routing::get, Router};
use chrono::Utc;

use crate::api::{DynAPI, API};
use crate::server::handlers::{drivers, rides, socket};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn serve<T: API + Send + Sync + 'static>(api: T) {
    let api = Arc::new(api) as DynAPI;

    start_maintenance(Arc::clone(&api));

    let app = Router::new()
        .route("/ws", get(socket::upgrade))
        .route("/drivers", get(drivers::snapshot))
        .route("/drivers/nearby", get(drivers::nearby))
        .route("/rides/:id", get(rides::find))
        .layer(Extension(api));

    let port = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(5001);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}

/// Periodic maintenance: demote/remove stale drivers and drop stale rides,
/// on the same cadence as live mutations (never holding locks across I/O).
fn start_maintenance(api: DynAPI) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);

        loop {
            ticker.tick().await;

            let now = Utc::now();
            let removed_drivers = api.sweep(now).await;
            let removed_rides = api.sweep_rides(now).await;

            if removed_drivers > 0 || removed_rides > 0 {
                tracing::info!(removed_drivers, removed_rides, "maintenance sweep");
            }
        }
    });
}
