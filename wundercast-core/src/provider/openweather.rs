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

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    keys: ApiKeyStore,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
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

    async fn fetch_current(&self, query: &[(&str, String)]) -> Result<WeatherResult, FetchError> {
        let url = format!("{}/weather", self.base_url);
        let api_key = self.keys.current();

        let res = self
            .http
            .get(&url)
            .query(query)
            .query(&[("appid", api_key.as_str()), ("units", "metric")])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            debug!(%status, body = truncate_body(&body), "OpenWeather request failed");
            return Err(status_error(status).into());
        }

        let parsed: OwCurrentResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(parsed.into_result())
    }
}

fn status_error(status: StatusCode) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED => ApiError::InvalidKey,
        StatusCode::NOT_FOUND => ApiError::CityNotFound,
        _ => ApiError::ServerFailure,
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    main: OwMain,
    weather: Vec<OwWeather>,
}

impl OwCurrentResponse {
    fn into_result(self) -> WeatherResult {
        let icon = self.weather.first().map(|w| icon_glyph(&w.icon)).unwrap_or("?");

        WeatherResult::new(self.main.temp as i32, self.main.humidity as i32, icon, self.name)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn by_city(&self, city: &str) -> Result<WeatherResult, FetchError> {
        self.fetch_current(&[("q", city.to_string())]).await
    }

    async fn by_coordinates(&self, coordinates: Coordinates) -> Result<WeatherResult, FetchError> {
        self.fetch_current(&[
            ("lat", coordinates.lat.to_string()),
            ("lon", coordinates.lon.to_string()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    fn sample_response() -> serde_json::Value {
        serde_json::json!({
            "coord": { "lon": -0.1257, "lat": 51.5085 },
            "weather": [{ "id": 800, "main": "Clear", "description": "clear sky", "icon": "01d" }],
            "main": { "temp": 18.7, "feels_like": 18.1, "pressure": 1021, "humidity": 50 },
            "wind": { "speed": 3.6, "deg": 240 },
            "dt": 1_700_000_000,
            "name": "London",
            "cod": 200
        })
    }

    fn provider_for(server: &MockServer, key: &str) -> OpenWeatherProvider {
        OpenWeatherProvider::new(ApiKeyStore::new(key)).with_base_url(server.uri())
    }

    #[tokio::test]
    async fn by_city_parses_current_weather() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("q", "London"))
            .and(query_param("appid", "KEY"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_response()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server, "KEY");
        let result = provider.by_city("London").await.expect("lookup should succeed");

        assert_eq!(result, WeatherResult::new(18, 50, "☀", "London"));
    }

    #[tokio::test]
    async fn by_coordinates_sends_lat_lon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("lat", "51.5"))
            .and(query_param("lon", "-0.12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_response()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server, "KEY");
        let result = provider
            .by_coordinates(Coordinates {
                lat: 51.5,
                lon: -0.12,
            })
            .await
            .expect("lookup should succeed");

        assert_eq!(result.city_name, "London");
    }

    #[tokio::test]
    async fn status_codes_map_to_api_errors() {
        let cases = [
            (401_u16, ApiError::InvalidKey),
            (404, ApiError::CityNotFound),
            (500, ApiError::ServerFailure),
            (429, ApiError::ServerFailure),
        ];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(
                    ResponseTemplate::new(status)
                        .set_body_json(serde_json::json!({ "cod": status, "message": "nope" })),
                )
                .mount(&server)
                .await;

            let provider = provider_for(&server, "KEY");
            let err = provider.by_city("Atlantis").await.unwrap_err();
            assert_eq!(err, FetchError::Api(expected), "status {status}");
        }
    }

    #[tokio::test]
    async fn key_changes_apply_to_next_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("appid", "NEW"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_response()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("appid", "OLD"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let keys = ApiKeyStore::new("OLD");
        let provider = OpenWeatherProvider::new(keys.clone()).with_base_url(server.uri());

        assert_eq!(
            provider.by_city("London").await.unwrap_err(),
            FetchError::Api(ApiError::InvalidKey)
        );

        keys.set_key("NEW");
        assert!(provider.by_city("London").await.is_ok());
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"name\": 1}"))
            .mount(&server)
            .await;

        let provider = provider_for(&server, "KEY");
        let err = provider.by_city("London").await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_not_connected() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let provider = OpenWeatherProvider::new(ApiKeyStore::new("KEY"))
            .with_base_url(format!("http://127.0.0.1:{port}"));
        let err = provider.by_city("London").await.unwrap_err();

        assert_eq!(
            crate::error::ErrorClass::classify(&err),
            crate::error::ErrorClass::NoConnectivity
        );
    }
}
