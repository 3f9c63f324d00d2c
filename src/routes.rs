use axum::{
    extract::{rejection::QueryRejection, ConnectInfo, Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::{
    service::{QueryOptions, WeatherService},
    weather::{types::Normalized, RequestType},
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub weather: Arc<WeatherService>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Envelope the widget expects around every payload.
#[derive(Debug, Serialize)]
pub struct WeatherDataResponse {
    pub data: Normalized,
    pub status: u16,
}

impl WeatherDataResponse {
    fn ok(data: Normalized) -> Json<Self> {
        Json(Self { data, status: 200 })
    }
}

// Route handlers
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn weather_data(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    options: Result<Query<QueryOptions>, QueryRejection>,
) -> Json<WeatherDataResponse> {
    let request_type = match kind.parse::<RequestType>() {
        Ok(request_type) => request_type,
        Err(e) => {
            tracing::warn!("{}", e);
            return WeatherDataResponse::ok(Normalized::Empty);
        }
    };

    let options = match options {
        Ok(Query(options)) => options,
        Err(rejection) => {
            tracing::warn!("Rejected {} options: {}", request_type, rejection);
            return WeatherDataResponse::ok(Normalized::Empty);
        }
    };

    let client_ip = connect_info.map(|ConnectInfo(addr)| addr.ip());
    let data = state.weather.get_info(options, request_type, client_ip).await;
    if data.is_empty() {
        tracing::debug!("Responding with empty {} data", request_type);
    }

    WeatherDataResponse::ok(data)
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/weather_data/:type", get(weather_data))
        .with_state(state)
}
