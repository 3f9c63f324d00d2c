use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub openweather_api_key: String,
    pub openweather_base_url: String,
    pub openweather_weather_path: String,
    pub openweather_forecast_path: String,
    pub geolocation_url: String,
    pub geolocation_fallback_ip: String,
    pub test_mode: bool,
    pub fixture_path: Option<String>,
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
    pub http_timeout_secs: u64,
    pub app_timezone: String,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            openweather_api_key: String::new(),
            openweather_base_url: "https://api.openweathermap.org".to_string(),
            openweather_weather_path: "/data/2.5/weather".to_string(),
            openweather_forecast_path: "/data/2.5/forecast/daily".to_string(),
            geolocation_url: "http://www.geoplugin.net/json.gp".to_string(),
            geolocation_fallback_ip: "159.223.176.237".to_string(),
            test_mode: false,
            fixture_path: None,
            cache_ttl_secs: 5000,
            cache_capacity: 1000,
            http_timeout_secs: 10,
            app_timezone: "UTC".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source; `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let test_mode = lookup("WEATHER_TEST_MODE")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.test_mode);

        let openweather_api_key = match lookup("OPENWEATHER_API_KEY") {
            Some(key) if !key.trim().is_empty() => key,
            _ if test_mode => String::new(),
            _ => return Err(anyhow::anyhow!("OPENWEATHER_API_KEY not set")),
        };

        Ok(Config {
            openweather_api_key,
            openweather_base_url: lookup("OPENWEATHER_BASE_URL")
                .unwrap_or(defaults.openweather_base_url),
            openweather_weather_path: lookup("OPENWEATHER_WEATHER_PATH")
                .unwrap_or(defaults.openweather_weather_path),
            openweather_forecast_path: lookup("OPENWEATHER_FORECAST_PATH")
                .unwrap_or(defaults.openweather_forecast_path),
            geolocation_url: lookup("GEOLOCATION_URL").unwrap_or(defaults.geolocation_url),
            geolocation_fallback_ip: lookup("GEOLOCATION_FALLBACK_IP")
                .unwrap_or(defaults.geolocation_fallback_ip),
            test_mode,
            fixture_path: lookup("WEATHER_FIXTURE_PATH").filter(|p| !p.is_empty()),
            cache_ttl_secs: parse_number(&lookup, "WEATHER_CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            cache_capacity: parse_number(&lookup, "WEATHER_CACHE_CAPACITY", defaults.cache_capacity)?,
            http_timeout_secs: parse_number(&lookup, "HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
            app_timezone: lookup("APP_TIMEZONE").unwrap_or(defaults.app_timezone),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn timezone(&self) -> anyhow::Result<chrono_tz::Tz> {
        self.app_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| anyhow::anyhow!("Invalid timezone: {}", self.app_timezone))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> anyhow::Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got {:?}", key, raw)),
        None => Ok(default),
    }
}
