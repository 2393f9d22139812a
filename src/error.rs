use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::Debug;

#[derive(Debug)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        database_error(err)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.code {
            1..=99 => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            _ => (StatusCode::BAD_REQUEST, self.message.as_str()),
        };

        let body = Json(json!({
            "code": self.code,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub fn env_var_error(_: env::VarError) -> Error {
    Error {
        code: 1,
        message: "environment variable error".into(),
    }
}

pub fn database_error<T: Debug>(_: T) -> Error {
    Error {
        code: 2,
        message: "database error".into(),
    }
}

pub fn unknown_ride_error() -> Error {
    Error {
        code: 100,
        message: "unknown ride".into(),
    }
}

pub fn duplicate_ride_error() -> Error {
    Error {
        code: 101,
        message: "ride already exists".into(),
    }
}

pub fn already_resolved_error() -> Error {
    Error {
        code: 102,
        message: "ride is not in the expected state".into(),
    }
}

pub fn code_mismatch_error() -> Error {
    Error {
        code: 103,
        message: "verification code mismatch".into(),
    }
}

pub fn wrong_driver_error() -> Error {
    Error {
        code: 104,
        message: "driver is not assigned to this ride".into(),
    }
}

pub fn driver_unavailable_error() -> Error {
    Error {
        code: 105,
        message: "driver is not available".into(),
    }
}
