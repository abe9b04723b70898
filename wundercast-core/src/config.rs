use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    pipeline::GeoSettings,
    provider::ProviderId,
    readiness::{ApiKeyStore, ReachabilityProbe},
    retry::RetryPolicy,
};

/// Credentials and endpoint for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Override for the provider's API root, mostly useful against a mock server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_unit_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            delay_unit_ms: policy.delay_unit.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            delay_unit: Duration::from_millis(self.delay_unit_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// A fix is accepted once its horizontal accuracy is at most this many metres.
    pub accuracy_threshold_m: f64,

    /// Give up waiting for a fix after this long. Absent means wait forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_timeout_secs: Option<u64>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        let geo = GeoSettings::default();
        Self {
            accuracy_threshold_m: geo.accuracy_threshold,
            fix_timeout_secs: None,
        }
    }
}

impl GeoConfig {
    pub fn settings(&self) -> GeoSettings {
        GeoSettings {
            accuracy_threshold: self.accuracy_threshold_m,
            fix_timeout: self.fix_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachabilityConfig {
    /// Host to watch. Defaults to the active provider's API host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub port: u16,
    pub interval_secs: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 443,
            interval_secs: 5,
            connect_timeout_ms: 2000,
        }
    }
}

impl ReachabilityConfig {
    pub fn probe(&self, provider: ProviderId) -> ReachabilityProbe {
        let host = self.host.as_deref().unwrap_or(provider.api_host());
        ReachabilityProbe::new(host, self.port)
            .with_interval(Duration::from_secs(self.interval_secs.max(1)))
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
    }
}

/// Settings persisted between runs, one TOML file per user.
///
/// ```toml
/// default_provider = "openweather"
///
/// [providers.openweather]
/// api_key = "..."
///
/// [retry]
/// max_attempts = 4
/// delay_unit_ms = 1000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub default_provider: Option<String>,

    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub geo: GeoConfig,

    #[serde(default)]
    pub reachability: ReachabilityConfig,
}

impl Config {
    pub fn default_provider_id(&self) -> Result<ProviderId> {
        match self.default_provider.as_deref() {
            Some(name) => ProviderId::try_from(name),
            None => Err(anyhow!(
                "No default provider configured.\n\
                 Hint: run `wundercast configure <provider>` (e.g. `wundercast configure openweather`) first."
            )),
        }
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    pub fn set_default_provider(&mut self, id: ProviderId) {
        self.default_provider = Some(id.to_string());
    }

    /// Read the user's config file. A missing file is an empty config.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("Cannot read {}", path.display()));
            }
        };

        Self::parse(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }

        let rendered = toml::to_string_pretty(self).context("Cannot render config as TOML")?;
        fs::write(path, rendered).with_context(|| format!("Cannot write {}", path.display()))
    }

    pub fn config_file_path() -> Result<PathBuf> {
        ProjectDirs::from("dev", "wundercast", "wundercast")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Replace the key for `id`, keeping any `base_url` override. The first
    /// configured provider becomes the default.
    pub fn upsert_provider_api_key(&mut self, id: ProviderId, api_key: String) {
        match self.providers.get_mut(id.as_str()) {
            Some(entry) => entry.api_key = api_key,
            None => {
                self.providers
                    .insert(id.to_string(), ProviderConfig {
                        api_key,
                        base_url: None,
                    });
            }
        }

        if self.default_provider.is_none() {
            self.set_default_provider(id);
        }
    }

    pub fn provider_api_key(&self, id: ProviderId) -> Option<&str> {
        self.provider_config(id).map(|cfg| cfg.api_key.as_str())
    }

    pub fn provider_base_url(&self, id: ProviderId) -> Option<&str> {
        self.provider_config(id).and_then(|cfg| cfg.base_url.as_deref())
    }

    pub fn is_provider_configured(&self, id: ProviderId) -> bool {
        self.provider_api_key(id).is_some_and(|key| !key.trim().is_empty())
    }

    /// A key store seeded with the saved key for `id`, or empty.
    pub fn api_key_store(&self, id: ProviderId) -> ApiKeyStore {
        ApiKeyStore::new(self.provider_api_key(id).unwrap_or_default())
    }
}
