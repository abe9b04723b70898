use std::{sync::Arc, time::Duration};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use wundercast_core::{
    ApiKeyStore, BroadcastLocationProvider, Config, Connectivity, ConnectivityMonitor,
    LocationFix, Pipeline, PipelineDeps, PipelineSettings, ProviderId,
    provider::provider_from_config,
};

use crate::output::TerminalPresenter;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "wundercast", version, about = "Resilient weather lookups")]
pub struct Cli {
    /// Verbosity: -v info, -vv debug, -vvv trace.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Provider to use instead of the configured default.
    #[arg(long, global = true)]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,
    },

    /// Show the current weather for a city.
    Show {
        /// City name.
        city: String,

        /// Give up after this many seconds.
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },

    /// Interactive session reading commands from stdin.
    Watch {
        /// Latitude reported when locating.
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude reported when locating.
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;

        match self.command {
            Command::Configure { provider } => {
                let id = ProviderId::try_from(provider.as_str())?;
                let api_key = Password::new(&format!("API key for {id}:"))
                    .with_display_mode(PasswordDisplayMode::Masked)
                    .without_confirmation()
                    .prompt()
                    .context("Failed to read API key")?;

                config.upsert_provider_api_key(id, api_key.trim().to_string());
                config.save()?;
                println!("Saved API key for {id} to {}", Config::config_file_path()?.display());
            }
            Command::Show { city, timeout } => {
                let id = resolve_provider(&config, self.provider.as_deref())?;
                if !config.is_provider_configured(id) {
                    bail!(
                        "No API key configured for provider '{id}'.\n\
                         Hint: run `wundercast configure {id}` and enter your API key."
                    );
                }
                let session = Session::start(&config, id, None);
                let handle = session.pipeline.spawn(TerminalPresenter::quiet());

                handle.submit(city.as_str());
                match tokio::time::timeout(Duration::from_secs(timeout), handle.finish()).await {
                    Ok(finished) => {
                        finished.context("Pipeline task failed")?;
                    }
                    Err(_) => bail!("No result for '{city}' within {timeout}s"),
                }
            }
            Command::Watch { lat, lon } => {
                let id = resolve_provider(&config, self.provider.as_deref())?;
                let fix = lat.zip(lon).map(|(lat, lon)| LocationFix::new(lat, lon, 0.0));
                let session = Session::start(&config, id, fix);
                watch(session, &mut config, id).await?;
            }
        }

        Ok(())
    }
}

fn resolve_provider(config: &Config, explicit: Option<&str>) -> anyhow::Result<ProviderId> {
    match explicit {
        Some(name) => ProviderId::try_from(name),
        None => config.default_provider_id(),
    }
}

/// Collaborators shared by the commands that run the pipeline.
struct Session {
    pipeline: Pipeline,
    keys: ApiKeyStore,
}

impl Session {
    fn start(config: &Config, id: ProviderId, fix: Option<LocationFix>) -> Self {
        let keys = config.api_key_store(id);
        let connectivity = ConnectivityMonitor::new(Connectivity::Online);
        config.reachability.probe(id).spawn(connectivity.clone());

        let location = Arc::new(match fix {
            Some(fix) => BroadcastLocationProvider::with_fixed(fix),
            None => BroadcastLocationProvider::new(),
        });

        let settings = PipelineSettings {
            retry: config.retry.policy(),
            geo: config.geo.settings(),
            ..PipelineSettings::default()
        };
        let deps = PipelineDeps {
            provider: provider_from_config(id, config, keys.clone()),
            location,
            api_key: keys.clone(),
            connectivity,
        };

        info!(provider = %id, "pipeline ready");
        Self {
            pipeline: Pipeline::new(deps, settings),
            keys,
        }
    }
}

const WATCH_HELP: &str = "Type a city name and press enter. \
    Commands: :geo (use current location), :key <api key>, :quit";

async fn watch(session: Session, config: &mut Config, id: ProviderId) -> anyhow::Result<()> {
    let Session { pipeline, keys } = session;
    let handle = pipeline.spawn(TerminalPresenter::interactive());
    println!("{WATCH_HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest.trim())) {
            (":quit", _) | (":q", _) => break,
            (":geo", _) => {
                handle.locate_me();
            }
            (":key", "") => println!("Usage: :key <api key>"),
            (":key", key) => {
                keys.set_key(key);
                config.upsert_provider_api_key(id, key.to_string());
                config.save()?;
                println!("API key updated");
            }
            (":help", _) => println!("{WATCH_HELP}"),
            _ => {
                debug!(input = line, "submitting");
                handle.submit(line);
            }
        }
    }

    Ok(())
}
