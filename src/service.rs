use serde::{de, Deserialize, Deserializer};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::location::LocationResolver;
use crate::weather::{
    cache::ResponseCache, fetcher_from_config, normalize::Normalizer, types::Normalized, Query,
    RequestType, WeatherFetcher,
};

/// Options as they arrive from the widget, either flat (`q=...`) or nested the way
/// jQuery encodes an `options` object (`options[q]=...`). Form fields left blank
/// count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryOptions {
    #[serde(default, alias = "options[q]", deserialize_with = "blank_as_none")]
    pub q: Option<String>,
    #[serde(default, alias = "options[lat]", deserialize_with = "coordinate")]
    pub lat: Option<f64>,
    #[serde(default, alias = "options[lon]", deserialize_with = "coordinate")]
    pub lon: Option<f64>,
    #[serde(default, alias = "options[cnt]", deserialize_with = "day_count")]
    pub cnt: Option<i64>,
}

fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<T>().map(Some).map_err(de::Error::custom),
    }
}

/// Coordinates must be finite; `NaN` and `inf` parse as `f64` but mean nothing to the provider.
fn coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match blank_as_none::<D, f64>(deserializer)? {
        Some(value) if !value.is_finite() => Err(de::Error::custom(format!(
            "coordinate must be a finite number, got {}",
            value
        ))),
        value => Ok(value),
    }
}

/// Day counts never reject a request. Integers outside `i64` saturate and anything
/// non-numeric counts as absent; clamping happens when the query is built.
fn day_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(value) = raw.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if let Ok(n) = value.parse::<i64>() {
        return Ok(Some(n));
    }

    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(Some(if negative { i64::MIN } else { i64::MAX }));
    }

    tracing::debug!("Ignoring non-numeric day count {:?}", value);
    Ok(None)
}

impl QueryOptions {
    /// Builds the provider query, or `None` when no usable location was supplied.
    /// A city name wins over coordinates.
    pub fn into_query(self, request_type: RequestType) -> Option<Query> {
        let query = match (self.q.as_deref(), self.lat, self.lon) {
            (Some(city), _, _) => Query::city(city),
            (_, Some(lat), Some(lon)) => Query::coordinates(lat, lon),
            _ => return None,
        };

        Some(scope_days(query, request_type, self.cnt))
    }
}

/// Day counts only apply to forecasts.
fn scope_days(query: Query, request_type: RequestType, cnt: Option<i64>) -> Query {
    match request_type {
        RequestType::Forecast => query.with_days(cnt),
        RequestType::Weather => query,
    }
}

/// Entry point used by the HTTP layer: location fallback, cached fetch, normalization.
pub struct WeatherService {
    resolver: LocationResolver,
    cache: ResponseCache,
    fetcher: Arc<dyn WeatherFetcher>,
    normalizer: Normalizer,
}

impl WeatherService {
    pub fn new(
        resolver: LocationResolver,
        cache: ResponseCache,
        fetcher: Arc<dyn WeatherFetcher>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            resolver,
            cache,
            fetcher,
            normalizer,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            LocationResolver::new(config)?,
            ResponseCache::new(config.cache_ttl(), config.cache_capacity),
            fetcher_from_config(config)?,
            Normalizer::new(config.timezone()?),
        ))
    }

    /// Never fails: every upstream problem is logged and turned into `Normalized::Empty`.
    pub async fn get_info(
        &self,
        options: QueryOptions,
        request_type: RequestType,
        client_ip: Option<IpAddr>,
    ) -> Normalized {
        let cnt = options.cnt;
        let query = match options.into_query(request_type) {
            Some(query) => query,
            None => match self.resolver.resolve(client_ip).await {
                Ok(coords) => {
                    scope_days(Query::coordinates(coords.lat, coords.lon), request_type, cnt)
                }
                Err(e) => {
                    tracing::error!("Location lookup failed: {}", e);
                    return Normalized::Empty;
                }
            },
        };

        let fetcher = self.fetcher.clone();
        let fetch_query = query.clone();
        let raw = self
            .cache
            .get_or_fetch(&query, request_type, || async move {
                fetcher.fetch(&fetch_query, request_type).await
            })
            .await;

        match raw {
            Ok(payload) => self.normalizer.normalize(&payload, request_type),
            Err(e) => {
                tracing::error!("Failed to fetch {} data: {}", request_type, e);
                Normalized::Empty
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::FetchError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StubFetcher {
        calls: AtomicUsize,
        seen: Mutex<Vec<Query>>,
        reply: Result<String, u16>,
    }

    impl StubFetcher {
        fn replying(body: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                reply: Ok(body.to_string()),
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                reply: Err(status),
            })
        }
    }

    #[async_trait]
    impl WeatherFetcher for StubFetcher {
        async fn fetch(&self, query: &Query, _: RequestType) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(query.clone());
            match &self.reply {
                Ok(body) => Ok(body.clone()),
                Err(status) => Err(FetchError::ApiError {
                    status: reqwest::StatusCode::from_u16(*status).unwrap(),
                    body: String::new(),
                }),
            }
        }
    }

    fn service(fetcher: Arc<StubFetcher>, geolocation_url: String) -> WeatherService {
        let config = Config {
            geolocation_url,
            ..Config::default()
        };
        WeatherService::new(
            LocationResolver::new(&config).unwrap(),
            ResponseCache::new(Duration::from_secs(60), 100),
            fetcher,
            Normalizer::default(),
        )
    }

    fn current_weather(temp: f64) -> serde_json::Value {
        json!({
            "weather": [{"description": "haze", "icon": "50d"}],
            "main": {"temp": temp, "temp_min": temp, "temp_max": temp, "pressure": 1009, "humidity": 40},
            "wind": {"speed": 1.2, "deg": 30},
            "dt": 1_710_072_000,
            "sys": {"country": "NG"},
            "name": "Gusau",
            "cod": 200
        })
    }

    fn coordinates_options(lat: f64, lon: f64) -> QueryOptions {
        QueryOptions {
            lat: Some(lat),
            lon: Some(lon),
            ..QueryOptions::default()
        }
    }

    #[test]
    fn test_options_into_query() {
        let city = QueryOptions {
            q: Some("Kyiv".into()),
            lat: Some(1.0),
            lon: Some(2.0),
            cnt: Some(3),
        };
        assert_eq!(
            city.into_query(RequestType::Forecast),
            Some(Query::city("Kyiv").with_days(Some(3)))
        );

        assert_eq!(
            coordinates_options(1.0, 2.0).into_query(RequestType::Weather),
            Some(Query::coordinates(1.0, 2.0))
        );
        assert_eq!(
            coordinates_options(1.0, 2.0).into_query(RequestType::Forecast),
            Some(Query::coordinates(1.0, 2.0).with_days(Some(16)))
        );

        let half = QueryOptions {
            lat: Some(1.0),
            ..QueryOptions::default()
        };
        assert_eq!(half.into_query(RequestType::Weather), None);
        assert_eq!(QueryOptions::default().into_query(RequestType::Weather), None);
    }

    #[test]
    fn test_options_from_query_string() {
        let options: QueryOptions =
            serde_json::from_value(json!({"q": "  ", "lat": "50.4", "lon": "30.5", "cnt": ""}))
                .unwrap();
        assert_eq!(options.q, None);
        assert_eq!(options.lat, Some(50.4));
        assert_eq!(options.lon, Some(30.5));
        assert_eq!(options.cnt, None);

        let bad = serde_json::from_value::<QueryOptions>(json!({"lat": "north", "lon": "1"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_day_count_never_rejects() {
        let parse = |cnt: &str| {
            serde_json::from_value::<QueryOptions>(json!({ "cnt": cnt }))
                .unwrap()
                .cnt
        };
        assert_eq!(parse("7"), Some(7));
        assert_eq!(parse("-3"), Some(-3));
        assert_eq!(parse("99999999999"), Some(99_999_999_999));
        assert_eq!(parse("99999999999999999999999"), Some(i64::MAX));
        assert_eq!(parse("-99999999999999999999999"), Some(i64::MIN));
        assert_eq!(parse("many"), None);

        let forecast = |cnt: &str| {
            QueryOptions {
                q: Some("Paris".into()),
                cnt: parse(cnt),
                ..QueryOptions::default()
            }
            .into_query(RequestType::Forecast)
            .and_then(|query| query.cnt)
        };
        assert_eq!(forecast("99999999999"), Some(16));
        assert_eq!(forecast("-3"), Some(16));
        assert_eq!(forecast("many"), Some(16));
    }

    #[test]
    fn test_non_finite_coordinates_are_rejected() {
        for value in ["NaN", "inf", "-inf"] {
            let result =
                serde_json::from_value::<QueryOptions>(json!({"lat": value, "lon": "1.0"}));
            assert!(result.is_err(), "{} accepted as latitude", value);
        }
    }

    #[test]
    fn test_nested_options_keys() {
        let options: QueryOptions = serde_json::from_value(json!({
            "options[q]": "Paris",
            "options[lat]": "",
            "options[lon]": "",
            "options[cnt]": "3"
        }))
        .unwrap();
        assert_eq!(options.q.as_deref(), Some("Paris"));
        assert_eq!(options.lat, None);
        assert_eq!(options.cnt, Some(3));
    }

    #[tokio::test]
    async fn test_live_weather_success() {
        let fetcher = StubFetcher::replying(current_weather(295.5));
        let service = service(fetcher.clone(), "http://127.0.0.1:9/unused".into());

        let result = service
            .get_info(coordinates_options(10.0, 20.0), RequestType::Weather, None)
            .await;

        let Normalized::Current(current) = result else {
            panic!("expected current weather");
        };
        assert_eq!(current.temperature, "22°C");
        assert_eq!(fetcher.seen.lock().unwrap()[0], Query::coordinates(10.0, 20.0));
    }

    #[tokio::test]
    async fn test_provider_failure_status_is_empty() {
        let fetcher = StubFetcher::replying(json!({"cod": 404, "message": "city not found"}));
        let service = service(fetcher, "http://127.0.0.1:9/unused".into());

        let result = service
            .get_info(coordinates_options(10.0, 20.0), RequestType::Weather, None)
            .await;
        assert!(result.is_empty());
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_transport_failure_is_empty_and_not_cached() {
        let fetcher = StubFetcher::failing(500);
        let service = service(fetcher.clone(), "http://127.0.0.1:9/unused".into());

        for _ in 0..2 {
            let result = service
                .get_info(coordinates_options(10.0, 20.0), RequestType::Forecast, None)
                .await;
            assert!(result.is_empty());
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_identical_call_is_served_from_cache() {
        let fetcher = StubFetcher::replying(current_weather(300.0));
        let service = service(fetcher.clone(), "http://127.0.0.1:9/unused".into());

        let first = service
            .get_info(coordinates_options(10.0, 20.0), RequestType::Weather, None)
            .await;
        let second = service
            .get_info(coordinates_options(10.0, 20.0), RequestType::Weather, None)
            .await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_options_resolve_location_from_ip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("ip", "198.51.100.20"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"geoplugin_latitude":"48.9226","geoplugin_longitude":"24.7111"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = StubFetcher::replying(json!({
            "cod": "200",
            "city": {"name": "Ivano-Frankivsk", "country": "UA"},
            "list": []
        }));
        let service = service(fetcher.clone(), server.uri());

        let options = QueryOptions {
            cnt: Some(7),
            ..QueryOptions::default()
        };
        let result = service
            .get_info(options, RequestType::Forecast, Some("198.51.100.20".parse().unwrap()))
            .await;

        assert!(matches!(result, Normalized::Forecast(_)));
        assert_eq!(
            fetcher.seen.lock().unwrap()[0],
            Query::coordinates(48.9226, 24.7111).with_days(Some(7))
        );
    }

    #[tokio::test]
    async fn test_failed_location_lookup_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = StubFetcher::replying(current_weather(290.0));
        let service = service(fetcher.clone(), server.uri());

        let result = service
            .get_info(QueryOptions::default(), RequestType::Weather, None)
            .await;
        assert!(result.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
