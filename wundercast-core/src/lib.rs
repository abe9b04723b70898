//! Core library for the `wundercast` weather pipeline.
//!
//! This crate defines:
//! - The query pipeline: request sources, classified retries, result cache
//!   and the aggregated busy state
//! - Abstractions over weather providers, location and readiness signals
//! - Configuration & credentials handling
//!
//! It is used by `wundercast-cli`, but can drive any presentation layer that
//! implements [`Presenter`].

pub mod busy;
pub mod cache;
pub mod config;
pub mod error;
pub mod location;
pub mod model;
pub mod pipeline;
pub mod presenter;
pub mod provider;
pub mod readiness;
pub mod retry;
pub mod source;

pub use cache::ResultCache;
pub use config::{Config, ProviderConfig};
pub use error::{ApiError, ErrorClass, FetchError, TerminalFailure, TransportKind};
pub use location::{BroadcastLocationProvider, LocationProvider};
pub use model::{Coordinates, InputEvent, LocationFix, QueryKey, QueryRequest, WeatherResult};
pub use pipeline::{GeoSettings, Pipeline, PipelineDeps, PipelineHandle, PipelineSettings};
pub use presenter::{CURRENT_LOCATION_LABEL, Presenter};
pub use provider::{ProviderId, WeatherProvider};
pub use readiness::{ApiKeyStore, Connectivity, ConnectivityMonitor, ReachabilityProbe};
pub use retry::{Recovery, RecoveryTable, RetryEngine, RetryPolicy};
