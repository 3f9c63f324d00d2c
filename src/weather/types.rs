use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

// Provider payloads (OpenWeather). Temperatures arrive in Kelvin.

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentResponse {
    pub main: CurrentMain,
    pub weather: Vec<Condition>,
    pub wind: Value,
    pub name: String,
    #[serde(default)]
    pub sys: Option<CurrentSys>,
    pub dt: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentMain {
    pub temp: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: Number,
    pub pressure: Number,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentSys {
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyForecastResponse {
    pub city: ForecastCity,
    pub list: Vec<DailyItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastCity {
    pub name: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyItem {
    pub dt: i64,
    pub temp: DailyTemp,
    pub weather: Vec<Condition>,
    pub humidity: Number,
    pub pressure: Number,
    pub speed: Number,
    pub deg: Number,
    #[serde(default)]
    pub gust: Option<Number>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyTemp {
    pub min: f64,
    pub max: f64,
    pub eve: f64,
}

// Normalized shapes handed to the widget. Field names on the wire follow the
// chart front-end's expectations.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentWeather {
    #[serde(rename = "temp")]
    pub temperature: String,
    pub temp_min: String,
    pub temp_max: String,
    pub description: String,
    pub icon: String,
    pub humidity: String,
    pub pressure: Number,
    pub wind: Value,
    #[serde(rename = "name")]
    pub location_name: String,
    pub country: String,
    #[serde(rename = "dt")]
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub general: ForecastGeneral,
    #[serde(rename = "list")]
    pub days: Vec<ForecastDay>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastGeneral {
    pub name: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDay {
    pub date: String,
    pub description: String,
    pub icon: String,
    pub min: i64,
    pub max: i64,
    pub eve: i64,
    pub humidity: Number,
    pub pressure: Number,
    pub wind: ForecastWind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastWind {
    pub speed: Number,
    pub deg: Number,
    pub gust: Option<Number>,
}

/// Result of normalization. `Empty` serializes as `{}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Current(CurrentWeather),
    Forecast(Forecast),
    Empty,
}

impl Normalized {
    pub fn is_empty(&self) -> bool {
        matches!(self, Normalized::Empty)
    }
}

impl Serialize for Normalized {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        match self {
            Normalized::Current(current) => current.serialize(serializer),
            Normalized::Forecast(forecast) => forecast.serialize(serializer),
            Normalized::Empty => serializer.serialize_map(Some(0))?.end(),
        }
    }
}
