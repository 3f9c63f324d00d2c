pub mod cache;
pub mod fixture;
pub mod normalize;
pub mod openweather;
pub mod types;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use fixture::FixtureFetcher;
use openweather::OpenWeatherClient;

/// Upper bound the provider accepts for daily forecasts, also the default day count.
pub const MAX_FORECAST_DAYS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Weather,
    Forecast,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Weather => "weather",
            RequestType::Forecast => "forecast",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "weather" => Ok(RequestType::Weather),
            "forecast" => Ok(RequestType::Forecast),
            other => Err(format!("Unknown request type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    City(String),
    Coordinates(Coordinates),
}

/// A fully resolved provider query. Serialization order is fixed, which the cache key relies on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnt: Option<u8>,
}

impl Query {
    pub fn city(name: impl Into<String>) -> Self {
        Self {
            location: Location::City(name.into()),
            cnt: None,
        }
    }

    pub fn coordinates(lat: f64, lon: f64) -> Self {
        Self {
            location: Location::Coordinates(Coordinates { lat, lon }),
            cnt: None,
        }
    }

    pub fn with_days(mut self, cnt: Option<i64>) -> Self {
        self.cnt = Some(clamp_day_count(cnt));
        self
    }

    /// Provider query parameters, without the API key.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = match &self.location {
            Location::City(name) => vec![("q", name.clone())],
            Location::Coordinates(c) => vec![("lat", c.lat.to_string()), ("lon", c.lon.to_string())],
        };
        if let Some(cnt) = self.cnt {
            params.push(("cnt", cnt.to_string()));
        }
        params
    }
}

/// Absent, zero or negative counts fall back to the maximum; anything above it is capped.
pub fn clamp_day_count(cnt: Option<i64>) -> u8 {
    match cnt {
        Some(n) if n > 0 => n.min(i64::from(MAX_FORECAST_DAYS)) as u8,
        _ => MAX_FORECAST_DAYS,
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("API error: HTTP {status}: {body}")]
    ApiError {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Fixture unavailable: {0}")]
    Fixture(String),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
}

/// Produces the raw provider payload for a query.
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    async fn fetch(&self, query: &Query, request_type: RequestType) -> Result<String, FetchError>;
}

/// Live client in normal operation, fixture-backed fetcher in test mode.
pub fn fetcher_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherFetcher>> {
    let live = OpenWeatherClient::new(config)?;

    let fetcher: Arc<dyn WeatherFetcher> = if config.test_mode {
        let fixture = match &config.fixture_path {
            Some(path) => FixtureFetcher::from_file(path, live)?,
            None => FixtureFetcher::bundled(live)?,
        };
        tracing::info!("Test mode enabled, forecasts are served from fixture data");
        Arc::new(fixture)
    } else {
        Arc::new(live)
    };

    Ok(fetcher)
}
