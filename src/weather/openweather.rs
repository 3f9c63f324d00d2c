use async_trait::async_trait;
use reqwest::Client;

use super::{FetchError, Query, RequestType, WeatherFetcher};
use crate::config::Config;

pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    weather_path: String,
    forecast_path: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("WeatherWidgetServer/1.0")
            .timeout(config.http_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.openweather_base_url.trim_end_matches('/').to_string(),
            weather_path: config.openweather_weather_path.clone(),
            forecast_path: config.openweather_forecast_path.clone(),
            api_key: config.openweather_api_key.clone(),
        })
    }

    pub async fn get_current(&self, query: &Query) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, self.weather_path);
        self.make_request(&url, query).await
    }

    pub async fn get_daily_forecast(&self, query: &Query) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, self.forecast_path);
        self.make_request(&url, query).await
    }

    async fn make_request(&self, url: &str, query: &Query) -> Result<String, FetchError> {
        let mut params = query.params();
        params.push(("appid", self.api_key.clone()));

        let response = self.client.get(url).query(&params).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::ApiError {
                status,
                body: truncate_body(&body),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl WeatherFetcher for OpenWeatherClient {
    async fn fetch(&self, query: &Query, request_type: RequestType) -> Result<String, FetchError> {
        tracing::debug!("Requesting {} from OpenWeather for {:?}", request_type, query.location);
        match request_type {
            RequestType::Weather => self.get_current(query).await,
            RequestType::Forecast => self.get_daily_forecast(query).await,
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
