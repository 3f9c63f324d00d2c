use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::net::IpAddr;
use thiserror::Error;

use crate::config::Config;
use crate::weather::Coordinates;

#[derive(Error, Debug)]
pub enum LocationError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Geolocation service returned HTTP {0}")]
    ApiError(reqwest::StatusCode),
    #[error("Unusable geolocation reply: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct GeoPluginReply {
    #[serde(default, deserialize_with = "coordinate")]
    geoplugin_latitude: Option<f64>,
    #[serde(default, deserialize_with = "coordinate")]
    geoplugin_longitude: Option<f64>,
}

/// Resolves approximate coordinates for a client IP through geoPlugin.
pub struct LocationResolver {
    client: Client,
    url: String,
    fallback_ip: String,
    test_mode: bool,
}

impl LocationResolver {
    pub fn new(config: &Config) -> Result<Self, LocationError> {
        let client = Client::builder()
            .user_agent("WeatherWidgetServer/1.0")
            .timeout(config.http_timeout())
            .build()?;

        Ok(Self {
            client,
            url: config.geolocation_url.clone(),
            fallback_ip: config.geolocation_fallback_ip.clone(),
            test_mode: config.test_mode,
        })
    }

    /// Loopback or unknown clients, and every client in test mode, are looked up
    /// under the fallback IP so the reply is always a real location.
    pub fn lookup_ip(&self, client_ip: Option<IpAddr>) -> String {
        match client_ip {
            Some(ip) if !self.test_mode && !ip.is_loopback() => ip.to_string(),
            _ => self.fallback_ip.clone(),
        }
    }

    pub async fn resolve(&self, client_ip: Option<IpAddr>) -> Result<Coordinates, LocationError> {
        let ip = self.lookup_ip(client_ip);
        tracing::debug!("Resolving location for IP {}", ip);

        let response = self
            .client
            .get(&self.url)
            .query(&[("ip", ip.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LocationError::ApiError(response.status()));
        }

        let body = response.text().await?;
        let reply: GeoPluginReply = serde_json::from_str(&body)
            .map_err(|e| LocationError::Malformed(e.to_string()))?;

        match (reply.geoplugin_latitude, reply.geoplugin_longitude) {
            (Some(lat), Some(lon)) => Ok(Coordinates { lat, lon }),
            _ => Err(LocationError::Malformed(format!(
                "no coordinates for IP {}",
                ip
            ))),
        }
    }
}

/// geoPlugin sends coordinates as strings; accept plain numbers too.
fn coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
