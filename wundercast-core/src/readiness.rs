//! Externally owned readiness signals: the user's API key and network
//! connectivity.
//!
//! Both are cloneable handles over a [`tokio::sync::watch`] channel so the
//! pipeline can be constructed with real or fake sources alike.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{net::TcpStream, sync::watch, task::JoinHandle, time};
use tracing::{debug, info};

/// Current API key, written by the presentation layer and read by providers.
#[derive(Debug, Clone)]
pub struct ApiKeyStore {
    tx: Arc<watch::Sender<String>>,
}

impl Default for ApiKeyStore {
    fn default() -> Self {
        Self::new("")
    }
}

impl ApiKeyStore {
    pub fn new(initial: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(initial.into());
        Self { tx: Arc::new(tx) }
    }

    pub fn set_key(&self, key: impl Into<String>) {
        self.tx.send_replace(key.into());
    }

    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }

    /// Resolves once the store holds a non-empty key other than `rejected`,
    /// immediately if it already does.
    ///
    /// Writing `rejected` again keeps the wait pending. Subscription happens
    /// eagerly, before the future is polled.
    pub fn wait_for_new_key(&self, rejected: &str) -> impl Future<Output = ()> + Send + use<> {
        let rejected = rejected.trim().to_owned();
        let mut rx = self.tx.subscribe();
        async move {
            let replaced = rx.wait_for(|key| {
                let key = key.trim();
                !key.is_empty() && key != rejected
            });
            if replaced.await.is_err() {
                std::future::pending::<()>().await
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

/// Process-wide connectivity state, fed by a [`ReachabilityProbe`] or a test.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<Connectivity>>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::Online)
    }
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Record a new state; subscribers are woken only on transitions.
    pub fn report(&self, state: Connectivity) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            info!(?state, "connectivity changed");
        }
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }

    /// Resolves once the state is `Online`, immediately if it already is.
    pub fn wait_until_online(&self) -> impl Future<Output = ()> + Send + use<> {
        let mut rx = self.tx.subscribe();
        async move {
            if rx.wait_for(|state| *state == Connectivity::Online).await.is_err() {
                std::future::pending::<()>().await
            }
        }
    }
}

/// Periodically checks whether a fixed host accepts TCP connections.
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    host: String,
    port: u16,
    interval: Duration,
    connect_timeout: Duration,
}

impl ReachabilityProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub async fn check(&self) -> Connectivity {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(_)) => Connectivity::Online,
            Ok(Err(err)) => {
                debug!(host = %self.host, error = %err, "reachability check failed");
                Connectivity::Offline
            }
            Err(_) => {
                debug!(host = %self.host, "reachability check timed out");
                Connectivity::Offline
            }
        }
    }

    /// Start monitoring in the background, reporting into `monitor`.
    pub fn spawn(self, monitor: ConnectivityMonitor) -> JoinHandle<()> {
        info!(host = %self.host, port = self.port, "starting reachability monitor");
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.report(self.check().await);
            }
        })
    }
}
