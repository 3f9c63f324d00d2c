use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::types::*;
use super::RequestType;

const KELVIN_OFFSET: f64 = 273.15;

/// Converts raw provider JSON into the widget's stable shapes.
#[derive(Debug, Clone)]
pub struct Normalizer {
    timezone: Tz,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl Normalizer {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn normalize(&self, raw: &str, request_type: RequestType) -> Normalized {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Discarding undecodable {} payload: {}", request_type, e);
                return Normalized::Empty;
            }
        };

        if !is_success_code(value.get("cod")) {
            let code = value.get("cod").cloned().unwrap_or_default();
            tracing::warn!(
                code = %code,
                "Provider reported failure for {} request",
                request_type
            );
            return Normalized::Empty;
        }

        let normalized = match request_type {
            RequestType::Weather => {
                decode::<CurrentResponse>(value, request_type).and_then(|r| self.current(r))
            }
            RequestType::Forecast => {
                decode::<DailyForecastResponse>(value, request_type).and_then(|r| self.forecast(r))
            }
        };

        normalized.unwrap_or(Normalized::Empty)
    }

    fn current(&self, response: CurrentResponse) -> Option<Normalized> {
        let condition = first_condition(&response.weather)?;
        let main = &response.main;

        Some(Normalized::Current(CurrentWeather {
            temperature: celsius_label(main.temp),
            temp_min: celsius_label(main.temp_min),
            temp_max: celsius_label(main.temp_max),
            description: condition.description.clone(),
            icon: condition.icon.clone(),
            humidity: format!("{}%", main.humidity),
            pressure: main.pressure.clone(),
            wind: response.wind,
            location_name: response.name,
            country: response.sys.and_then(|s| s.country).unwrap_or_default(),
            date: self.format_date(response.dt)?,
        }))
    }

    fn forecast(&self, response: DailyForecastResponse) -> Option<Normalized> {
        let mut days = Vec::with_capacity(response.list.len());
        let mut labels = Vec::with_capacity(response.list.len());

        for item in response.list {
            let condition = first_condition(&item.weather)?;
            let date = self.format_date(item.dt)?;
            labels.push(date.clone());

            days.push(ForecastDay {
                date,
                description: condition.description.clone(),
                icon: condition.icon.clone(),
                min: kelvin_to_celsius(item.temp.min),
                max: kelvin_to_celsius(item.temp.max),
                eve: kelvin_to_celsius(item.temp.eve),
                humidity: item.humidity,
                pressure: item.pressure,
                wind: ForecastWind {
                    speed: item.speed,
                    deg: item.deg,
                    gust: item.gust,
                },
            });
        }

        Some(Normalized::Forecast(Forecast {
            general: ForecastGeneral {
                name: response.city.name,
                country: response.city.country,
            },
            days,
            labels,
        }))
    }

    /// Renders an epoch timestamp as `MM/DD` in the configured zone.
    fn format_date(&self, timestamp: i64) -> Option<String> {
        let utc = DateTime::from_timestamp(timestamp, 0)?;
        Some(self.timezone.from_utc_datetime(&utc.naive_utc()).format("%m/%d").to_string())
    }
}

pub fn kelvin_to_celsius(kelvin: f64) -> i64 {
    (kelvin - KELVIN_OFFSET).round() as i64
}

fn celsius_label(kelvin: f64) -> String {
    format!("{}°C", kelvin_to_celsius(kelvin))
}

/// The provider reports `cod` as a number for current weather and as a string for forecasts.
fn is_success_code(code: Option<&Value>) -> bool {
    match code {
        Some(Value::Number(n)) => n.as_u64() == Some(200),
        Some(Value::String(s)) => s.trim() == "200",
        _ => false,
    }
}

fn decode<T: DeserializeOwned>(value: Value, request_type: RequestType) -> Option<T> {
    serde_json::from_value(value)
        .map_err(|e| tracing::warn!("Malformed {} payload: {}", request_type, e))
        .ok()
}

fn first_condition(conditions: &[Condition]) -> Option<&Condition> {
    let condition = conditions.first();
    if condition.is_none() {
        tracing::warn!("Payload carries no weather condition entry");
    }
    condition
}
