use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Extension;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use crate::api::DynAPI;
use crate::entities::{ConnectionId, Coordinates, DriverStatus, Place};
use crate::error::Error;
use crate::fanout::{Event, NearbyDriver, Party};

type WsSink = SplitSink<WebSocket, Message>;

fn default_radius() -> f64 {
    5000.0
}

fn default_vehicle() -> String {
    "taxi".into()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    RegisterDriver {
        driver_id: String,
        #[serde(default)]
        name: Option<String>,
        location: Coordinates,
        #[serde(default = "default_vehicle")]
        vehicle_type: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateLocation {
        driver_id: String,
        location: Coordinates,
    },
    #[serde(rename_all = "camelCase")]
    Heartbeat { driver_id: String },
    #[serde(rename_all = "camelCase")]
    SetStatus {
        driver_id: String,
        status: DriverStatus,
    },
    #[serde(rename_all = "camelCase")]
    QueryNearby {
        origin: Coordinates,
        #[serde(default = "default_radius")]
        radius_m: f64,
        #[serde(default)]
        vehicle_type: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    BookRide {
        ride_id: String,
        user_id: String,
        pickup: Place,
        dropoff: Place,
        #[serde(default = "default_vehicle")]
        vehicle_type: String,
    },
    #[serde(rename_all = "camelCase")]
    AcceptRide {
        ride_id: String,
        driver_id: String,
        driver_name: String,
    },
    #[serde(rename_all = "camelCase")]
    RejectRide {
        ride_id: String,
        driver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    VerifyCode {
        ride_id: String,
        driver_id: String,
        code: u32,
    },
    #[serde(rename_all = "camelCase")]
    CompleteRide {
        ride_id: String,
        driver_id: String,
        distance_km: f64,
    },
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    Extension(api): Extension<DynAPI>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle(socket, api))
}

/// One task per connection: inbound events are applied in arrival order,
/// outbound events are filtered by the party this connection identified as.
async fn handle(socket: WebSocket, api: DynAPI) {
    let (mut sink, mut stream) = socket.split();
    let mut events = api.subscribe();
    let connection = ConnectionId::new();
    let mut party = Party::Unknown;

    tracing::debug!(?connection, "client connected");

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if apply(&text, &api, &mut sink, &mut party, connection).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            published = events.recv() => {
                match published {
                    Ok(envelope) => {
                        if envelope.audience.includes(&party)
                            && send_event(&mut sink, &envelope.event).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(?party, skipped, "connection lagged behind fanout");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    if let Party::Driver(driver_id) = &party {
        tracing::info!(driver_id = %driver_id, "driver connection closed");
        api.mark_disconnected(driver_id, connection).await;
    }
}

async fn apply(
    text: &str,
    api: &DynAPI,
    sink: &mut WsSink,
    party: &mut Party,
    connection: ConnectionId,
) -> Result<(), axum::Error> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!(%error, "ignoring malformed client event");
            return Ok(());
        }
    };

    match event {
        ClientEvent::RegisterDriver {
            driver_id,
            name,
            location,
            vehicle_type,
        } => {
            let name = name.unwrap_or_else(|| format!("Driver {}", driver_id));

            *party = Party::Driver(driver_id.clone());
            api.register_driver(driver_id, name, location, vehicle_type, connection)
                .await;
        }
        ClientEvent::UpdateLocation {
            driver_id,
            location,
        } => {
            api.update_location(&driver_id, location).await;
        }
        ClientEvent::Heartbeat { driver_id } => {
            api.heartbeat(&driver_id).await;
        }
        ClientEvent::SetStatus { driver_id, status } => {
            api.set_status(&driver_id, status).await;
        }
        ClientEvent::QueryNearby {
            origin,
            radius_m,
            vehicle_type,
        } => {
            let drivers = api
                .nearby(origin, radius_m, vehicle_type.as_deref())
                .await
                .into_iter()
                .map(|(driver, distance_m)| NearbyDriver { driver, distance_m })
                .collect();

            send_event(sink, &Event::NearbyDriversResult { drivers }).await?;
        }
        ClientEvent::BookRide {
            ride_id,
            user_id,
            pickup,
            dropoff,
            vehicle_type,
        } => {
            if *party == Party::Unknown {
                *party = Party::Rider(user_id.clone());
            }

            if let Err(error) = api
                .book_ride(ride_id, user_id, pickup, dropoff, vehicle_type)
                .await
            {
                send_error(sink, error).await?;
            }
        }
        ClientEvent::AcceptRide {
            ride_id,
            driver_id,
            driver_name,
        } => {
            if let Err(error) = api.accept_ride(&ride_id, &driver_id, &driver_name).await {
                send_error(sink, error).await?;
            }
        }
        ClientEvent::RejectRide { ride_id, driver_id } => {
            if let Err(error) = api.reject_ride(&ride_id, &driver_id).await {
                send_error(sink, error).await?;
            }
        }
        ClientEvent::VerifyCode {
            ride_id,
            driver_id,
            code,
        } => {
            if let Err(error) = api.verify_code(&ride_id, &driver_id, code).await {
                send_error(sink, error).await?;
            }
        }
        ClientEvent::CompleteRide {
            ride_id,
            driver_id,
            distance_km,
        } => {
            if let Err(error) = api.complete_ride(&ride_id, &driver_id, distance_km).await {
                send_error(sink, error).await?;
            }
        }
    }

    Ok(())
}

async fn send_event(sink: &mut WsSink, event: &Event) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(payload) => sink.send(Message::Text(payload)).await,
        Err(error) => {
            tracing::error!(%error, "failed to encode outbound event");
            Ok(())
        }
    }
}

/// Errors go back to the originating caller only, never through the fanout.
async fn send_error(sink: &mut WsSink, error: Error) -> Result<(), axum::Error> {
    let payload = json!({
        "event": "error",
        "data": { "code": error.code, "message": error.message },
    });

    sink.send(Message::Text(payload.to_string())).await
}

#[cfg(test)]
mod tests {
    use super::ClientEvent;

    #[test]
    fn decodes_register_driver_with_defaults() {
        let event: ClientEvent = serde_json::from_str(
            r#"{
                "type": "registerDriver",
                "driverId": "d1",
                "location": { "latitude": 12.90, "longitude": 77.59 }
            }"#,
        )
        .unwrap();

        match event {
            ClientEvent::RegisterDriver {
                driver_id,
                name,
                vehicle_type,
                ..
            } => {
                assert_eq!(driver_id, "d1");
                assert!(name.is_none());
                assert_eq!(vehicle_type, "taxi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn decodes_book_ride() {
        let event: ClientEvent = serde_json::from_str(
            r#"{
                "type": "bookRide",
                "rideId": "r1",
                "userId": "u1",
                "pickup": { "coordinates": { "latitude": 12.90, "longitude": 77.59 } },
                "dropoff": {
                    "coordinates": { "latitude": 12.93, "longitude": 77.61 },
                    "label": "MG Road"
                },
                "vehicleType": "taxi"
            }"#,
        )
        .unwrap();

        match event {
            ClientEvent::BookRide {
                ride_id, dropoff, ..
            } => {
                assert_eq!(ride_id, "r1");
                assert_eq!(dropoff.label.as_deref(), Some("MG Road"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_event_type() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{ "type": "teleport", "driverId": "d1" }"#);

        assert!(result.is_err());
    }
}
