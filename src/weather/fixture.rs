use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::path::Path;

use super::openweather::OpenWeatherClient;
use super::{FetchError, Query, RequestType, WeatherFetcher, MAX_FORECAST_DAYS};

const BUNDLED_FORECAST: &str = include_str!("../../fixtures/forecast_daily.json");

/// Serves daily forecasts from a fixture document with timestamps rebased onto the
/// current day. Current-weather requests still go to the live client.
pub struct FixtureFetcher {
    template: Value,
    live: OpenWeatherClient,
}

impl FixtureFetcher {
    pub fn bundled(live: OpenWeatherClient) -> Result<Self, FetchError> {
        Self::from_json(BUNDLED_FORECAST, live)
    }

    pub fn from_file(path: impl AsRef<Path>, live: OpenWeatherClient) -> Result<Self, FetchError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FetchError::Fixture(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw, live)
    }

    fn from_json(raw: &str, live: OpenWeatherClient) -> Result<Self, FetchError> {
        let template: Value = serde_json::from_str(raw)?;
        if !template.get("list").is_some_and(Value::is_array) {
            return Err(FetchError::Fixture(
                "forecast fixture has no `list` array".to_string(),
            ));
        }
        Ok(Self { template, live })
    }

    /// Builds a forecast payload of at most `cnt` days whose `dt` values start at `now`
    /// and advance by one day each.
    pub fn synthesize(&self, cnt: Option<u8>, now: DateTime<Utc>) -> Result<String, FetchError> {
        let mut data = self.template.clone();

        if let Some(Value::Array(list)) = data.get_mut("list") {
            if let Some(cnt) = cnt.filter(|c| *c > 0 && *c < MAX_FORECAST_DAYS) {
                list.truncate(cnt as usize);
            }

            let mut time = now;
            for day in list.iter_mut() {
                if let Some(day) = day.as_object_mut() {
                    day.insert("dt".to_string(), Value::from(time.timestamp()));
                }
                time += Duration::days(1);
            }
        }

        Ok(serde_json::to_string(&data)?)
    }
}

#[async_trait]
impl WeatherFetcher for FixtureFetcher {
    async fn fetch(&self, query: &Query, request_type: RequestType) -> Result<String, FetchError> {
        match request_type {
            RequestType::Forecast => {
                tracing::debug!("Serving forecast fixture ({:?} days)", query.cnt);
                self.synthesize(query.cnt, Utc::now())
            }
            // No fixture exists for current conditions.
            RequestType::Weather => self.live.fetch(query, request_type).await,
        }
    }
}
