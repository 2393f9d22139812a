use axum::extract::{Extension, Json, Path};

use crate::api::DynAPI;
use crate::entities::RideRequest;
use crate::error::Error;

pub async fn find(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<String>,
) -> Result<Json<RideRequest>, Error> {
    let ride = api.find_ride(&id).await?;

    Ok(ride.into())
}
