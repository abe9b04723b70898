use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{ApiError, FetchError},
    model::{Coordinates, WeatherResult, icon_glyph},
    provider::truncate_body,
    readiness::ApiKeyStore,
};

use super::WeatherProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// WeatherAPI.com error code for "No location found matching parameter 'q'".
const NO_LOCATION_FOUND: u32 = 1006;

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    keys: ApiKeyStore,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(keys: ApiKeyStore) -> Self {
        Self {
            keys,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_current(&self, q: &str) -> Result<WeatherResult, FetchError> {
        let url = format!("{}/current.json", self.base_url);
        let api_key = self.keys.current();

        let res = self
            .http
            .get(&url)
            .query(&[("key", api_key.as_str()), ("q", q)])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            debug!(%status, body = truncate_body(&body), "WeatherAPI request failed");
            return Err(status_error(status, &body).into());
        }

        let parsed: WaResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        let icon = condition_icon(parsed.current.condition.code, parsed.current.is_day == 1);

        Ok(WeatherResult::new(
            parsed.current.temp_c as i32,
            parsed.current.humidity as i32,
            icon,
            parsed.location.name,
        ))
    }
}

fn status_error(status: StatusCode, body: &str) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::InvalidKey,
        StatusCode::BAD_REQUEST => {
            let code = serde_json::from_str::<WaErrorResponse>(body).map(|e| e.error.code);
            match code {
                Ok(NO_LOCATION_FOUND) => ApiError::CityNotFound,
                _ => ApiError::ServerFailure,
            }
        }
        _ => ApiError::ServerFailure,
    }
}

/// Translate a WeatherAPI.com condition code into the shared glyph set.
fn condition_icon(code: u32, is_day: bool) -> &'static str {
    let icon_code = match code {
        1000 if is_day => "01d",
        1000 => "01n",
        1003 => "02d",
        1006 => "03d",
        1009 => "04d",
        1030 | 1135 | 1147 => "50d",
        1087 | 1273..=1282 => "11d",
        1066 | 1069 | 1072 | 1114 | 1117 | 1204..=1237 | 1249..=1264 => "13d",
        1063 | 1150..=1201 => "10d",
        1240..=1246 => "09d",
        _ => "",
    };
    icon_glyph(icon_code)
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    code: u32,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    humidity: f64,
    is_day: u8,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    location: WaLocation,
    current: WaCurrent,
}

#[derive(Debug, Deserialize)]
struct WaError {
    code: u32,
}

#[derive(Debug, Deserialize)]
struct WaErrorResponse {
    error: WaError,
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn by_city(&self, city: &str) -> Result<WeatherResult, FetchError> {
        self.fetch_current(city).await
    }

    async fn by_coordinates(&self, coordinates: Coordinates) -> Result<WeatherResult, FetchError> {
        let q = format!("{},{}", coordinates.lat, coordinates.lon);
        self.fetch_current(&q).await
    }
}
