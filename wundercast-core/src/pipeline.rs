//! Wires the request sources, retry engine, cache and busy state into one
//! running pipeline.
//!
//! A single main task owns the [`Presenter`]. Raw input events arrive on one
//! channel, each accepted request runs in its own task, and every effect the
//! presenter sees is sent back to the main task and applied in arrival order.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    task::{JoinError, JoinHandle, JoinSet},
};
use tracing::{debug, error, info, warn};

use crate::{
    busy::BusyState,
    cache::ResultCache,
    error::ErrorClass,
    location::LocationProvider,
    model::{InputEvent, QueryRequest, WeatherResult},
    presenter::{self, CURRENT_LOCATION_LABEL, Presenter},
    provider::WeatherProvider,
    readiness::{ApiKeyStore, ConnectivityMonitor},
    retry::{RecoveryTable, RetryEngine, RetryPolicy},
    source::RequestSource,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoSettings {
    /// Largest acceptable horizontal accuracy, in metres.
    pub accuracy_threshold: f64,
    pub fix_timeout: Option<Duration>,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            accuracy_threshold: 10.0,
            fix_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub retry: RetryPolicy,
    pub recovery: RecoveryTable,
    pub geo: GeoSettings,
}

/// External collaborators the pipeline is built from.
#[derive(Debug, Clone)]
pub struct PipelineDeps {
    pub provider: Arc<dyn WeatherProvider>,
    pub location: Arc<dyn LocationProvider>,
    pub api_key: ApiKeyStore,
    pub connectivity: ConnectivityMonitor,
}

#[derive(Debug)]
enum UiEvent {
    Result(WeatherResult),
    Failure(ErrorClass),
}

#[derive(Debug)]
struct Shared {
    provider: Arc<dyn WeatherProvider>,
    source: RequestSource,
    engine: RetryEngine,
    cache: ResultCache,
}

#[derive(Debug)]
pub struct Pipeline {
    shared: Arc<Shared>,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, settings: PipelineSettings) -> Self {
        let engine =
            RetryEngine::new(settings.retry, settings.recovery, deps.api_key, deps.connectivity);
        let shared = Shared {
            provider: deps.provider,
            source: RequestSource::new(deps.location, settings.geo),
            engine,
            cache: ResultCache::new(),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.shared.cache
    }

    /// Start the main task. The presenter immediately receives the initial
    /// busy state.
    pub fn spawn<P>(self, presenter: P) -> PipelineHandle<P>
    where
        P: Presenter + 'static,
    {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let cache = self.shared.cache.clone();
        let main = tokio::spawn(run_main(self.shared, presenter, input_rx));
        PipelineHandle {
            input: input_tx,
            main,
            cache,
        }
    }
}

/// Feeds input events into a running pipeline.
#[derive(Debug)]
pub struct PipelineHandle<P> {
    input: mpsc::UnboundedSender<InputEvent>,
    main: JoinHandle<P>,
    cache: ResultCache,
}

impl<P> PipelineHandle<P> {
    /// Returns `false` once the pipeline has stopped.
    pub fn send(&self, event: InputEvent) -> bool {
        self.input.send(event).is_ok()
    }

    pub fn submit(&self, text: impl Into<String>) -> bool {
        self.send(InputEvent::Submit(text.into()))
    }

    pub fn locate_me(&self) -> bool {
        self.send(InputEvent::LocateMe)
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Stop accepting input, wait for every in-flight request to settle and
    /// hand the presenter back.
    ///
    /// Requests still waiting on a readiness signal or a location fix keep
    /// this pending.
    pub async fn finish(self) -> Result<P, JoinError> {
        drop(self.input);
        self.main.await
    }
}

async fn run_main<P: Presenter>(
    shared: Arc<Shared>,
    mut presenter: P,
    mut input: mpsc::UnboundedReceiver<InputEvent>,
) -> P {
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let mut ui_tx = Some(ui_tx);
    let mut workers = JoinSet::new();
    let mut busy = BusyState::new();
    busy.start(&mut presenter);

    loop {
        tokio::select! {
            event = input.recv(), if ui_tx.is_some() => match event {
                Some(event) => {
                    if let Some(tx) = &ui_tx {
                        handle_input(&shared, event, &mut presenter, &mut busy, tx, &mut workers);
                    }
                }
                None => {
                    debug!("input closed, draining in-flight requests");
                    ui_tx = None;
                }
            },
            ui = ui_rx.recv() => match ui {
                Some(UiEvent::Result(result)) => {
                    presenter.show_result(&result);
                    busy.emit(false, &mut presenter);
                }
                Some(UiEvent::Failure(class)) => presenter::notify(&mut presenter, class),
                None => break,
            },
            Some(joined) = workers.join_next(), if !workers.is_empty() => {
                settle_worker(joined, &mut presenter, &mut busy);
            }
        }
    }

    while let Some(joined) = workers.join_next().await {
        settle_worker(joined, &mut presenter, &mut busy);
    }

    presenter
}

/// A worker that died without reporting still owes the presenter a result.
fn settle_worker(
    joined: Result<(), JoinError>,
    presenter: &mut dyn Presenter,
    busy: &mut BusyState,
) {
    let Err(err) = joined else {
        return;
    };
    error!(error = %err, "request worker aborted");
    presenter::notify(presenter, ErrorClass::Unknown);
    presenter.show_result(&WeatherResult::empty());
    busy.emit(false, presenter);
}

fn handle_input(
    shared: &Arc<Shared>,
    event: InputEvent,
    presenter: &mut dyn Presenter,
    busy: &mut BusyState,
    ui_tx: &mpsc::UnboundedSender<UiEvent>,
    workers: &mut JoinSet<()>,
) {
    match event {
        InputEvent::Submit(raw) => {
            let Some(request) = shared.source.text_request(&raw) else {
                return;
            };
            busy.emit(true, presenter);

            let shared = shared.clone();
            let ui_tx = ui_tx.clone();
            workers.spawn(async move { run_request(&shared, request, &ui_tx).await });
        }
        InputEvent::LocateMe => {
            let located = shared.source.locate();
            presenter.show_placeholder(CURRENT_LOCATION_LABEL);
            busy.emit(true, presenter);

            let shared = shared.clone();
            let ui_tx = ui_tx.clone();
            workers.spawn(async move {
                if let Some(request) = located.await {
                    run_request(&shared, request, &ui_tx).await;
                }
            });
        }
    }
}

async fn run_request(
    shared: &Shared,
    request: QueryRequest,
    ui_tx: &mpsc::UnboundedSender<UiEvent>,
) {
    info!(%request, source = request.source(), "issuing weather request");

    let provider = &shared.provider;
    let cache = &shared.cache;
    let key = request.cache_key();
    let key = key.as_ref();
    let request_ref = &request;

    let outcome = shared
        .engine
        .execute(
            |attempt| async move {
                debug!(attempt, request = %request_ref, "weather lookup attempt");
                let outcome = provider.lookup(request_ref).await;
                if let (Ok(result), Some(key)) = (&outcome, key) {
                    cache.store(key.clone(), result.clone());
                }
                outcome
            },
            |class| {
                let _ = ui_tx.send(UiEvent::Failure(class));
            },
        )
        .await;

    let result = match outcome {
        Ok(result) => result,
        Err(failure) => {
            let fallback = shared.cache.fallback_for(&request);
            warn!(%request, %failure, cached = !fallback.is_empty(), "request failed for good");
            fallback
        }
    };

    let _ = ui_tx.send(UiEvent::Result(result));
}
