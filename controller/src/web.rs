use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono_tz::Tz;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use nerdostat_common::dispatch;

use crate::host::{now_in_timezone, SharedThermostat};

#[derive(Clone)]
pub struct WebState {
    pub thermostat: SharedThermostat,
    pub timezone: Tz,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/api/reading", get(handle_get_reading))
        .route("/api/methods/{method}", post(handle_method))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_get_reading(State(state): State<WebState>) -> Response {
    let reading = state.thermostat.lock().await.last_reading().cloned();
    match reading {
        Some(reading) => Json(reading).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no reading taken yet"),
    }
}

async fn handle_method(
    State(state): State<WebState>,
    Path(method): Path<String>,
    body: Bytes,
) -> Response {
    let now = now_in_timezone(state.timezone);
    let response = {
        let mut thermostat = state.thermostat.lock().await;
        dispatch(&mut *thermostat, &method, &body, now)
    };

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
