use crate::{
    Config,
    error::FetchError,
    model::{Coordinates, QueryRequest, WeatherResult},
    provider::{openweather::OpenWeatherProvider, weatherapi::WeatherApiProvider},
    readiness::ApiKeyStore,
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug, sync::Arc};

pub mod openweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi]
    }

    /// Host watched by the reachability probe when this provider is active.
    pub fn api_host(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweathermap.org",
            ProviderId::WeatherApi => "api.weatherapi.com",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi."
            )),
        }
    }
}

/// Remote weather lookup. Failures are raw; classification happens upstream.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn by_city(&self, city: &str) -> Result<WeatherResult, FetchError>;

    async fn by_coordinates(&self, coordinates: Coordinates) -> Result<WeatherResult, FetchError>;

    async fn lookup(&self, request: &QueryRequest) -> Result<WeatherResult, FetchError> {
        match request {
            QueryRequest::Text { city } => self.by_city(city).await,
            QueryRequest::Geo { coordinates } => self.by_coordinates(*coordinates).await,
        }
    }
}

/// Build the adapter for `id`, honouring a `base_url` override.
///
/// The provider reads its key from `keys` on every request, so a key supplied
/// later through the store takes effect without rebuilding the provider.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
    keys: ApiKeyStore,
) -> Arc<dyn WeatherProvider> {
    let base_url = config.provider_base_url(id).map(str::to_owned);

    match id {
        ProviderId::OpenWeather => {
            let provider = OpenWeatherProvider::new(keys);
            Arc::new(match base_url {
                Some(url) => provider.with_base_url(url),
                None => provider,
            })
        }
        ProviderId::WeatherApi => {
            let provider = WeatherApiProvider::new(keys);
            Arc::new(match base_url {
                Some(url) => provider.with_base_url(url),
                None => provider,
            })
        }
    }
}

/// Same as [`provider_from_config`] for the configured default provider.
pub fn default_provider_from_config(
    config: &Config,
    keys: ApiKeyStore,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let id = config.default_provider_id()?;
    Ok(provider_from_config(id, config, keys))
}

pub(crate) fn truncate_body(body: &str) -> &str {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!(ProviderId::try_from("OpenWeather").unwrap(), ProviderId::OpenWeather);
        assert_eq!(ProviderId::try_from("WEATHERAPI").unwrap(), ProviderId::WeatherApi);
        for id in ProviderId::all() {
            assert_eq!(ProviderId::try_from(id.to_string().as_str()).unwrap(), *id);
        }
    }

    #[test]
    fn unknown_provider_lists_supported_names() {
        let err = ProviderId::try_from("accuweather").unwrap_err().to_string();
        assert!(err.contains("'accuweather'"));
        assert!(err.contains("openweather, weatherapi"));
    }

    #[test]
    fn provider_hosts_are_distinct() {
        assert_ne!(ProviderId::OpenWeather.api_host(), ProviderId::WeatherApi.api_host());
    }

    #[test]
    fn default_provider_from_config_errors_when_not_set() {
        let cfg = Config::default();
        let err = default_provider_from_config(&cfg, ApiKeyStore::default()).unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("No default provider configured"));
        assert!(msg.contains("Hint: run `wundercast configure"));
    }

    #[test]
    fn default_provider_from_config_works_when_set() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "KEY".to_string());

        let provider = default_provider_from_config(&cfg, ApiKeyStore::new("KEY"));
        assert!(provider.is_ok());
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "☀".repeat(300);
        assert_eq!(truncate_body(&long).chars().count(), 200);
        assert_eq!(truncate_body("short"), "short");
    }
}
