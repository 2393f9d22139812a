use axum::extract::{Extension, Json, Query};
use serde::Deserialize;

use crate::api::DynAPI;
use crate::entities::{Coordinates, DriverPresence};
use crate::fanout::NearbyDriver;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyParams {
    latitude: f64,
    longitude: f64,
    radius_m: Option<f64>,
    vehicle_type: Option<String>,
}

pub async fn snapshot(Extension(api): Extension<DynAPI>) -> Json<Vec<DriverPresence>> {
    api.snapshot().await.into()
}

pub async fn nearby(
    Extension(api): Extension<DynAPI>,
    Query(params): Query<NearbyParams>,
) -> Json<Vec<NearbyDriver>> {
    let origin = Coordinates::new(params.latitude, params.longitude);
    let radius_m = params.radius_m.unwrap_or(5000.0);

    let results = api
        .nearby(origin, radius_m, params.vehicle_type.as_deref())
        .await;

    results
        .into_iter()
        .map(|(driver, distance_m)| NearbyDriver { driver, distance_m })
        .collect::<Vec<_>>()
        .into()
}
