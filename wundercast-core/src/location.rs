use std::{
    fmt::Debug,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::LocationFix;

/// Device location service.
///
/// Fixes are delivered through [`LocationProvider::subscribe`]; acquisition is
/// requested explicitly and may be stopped once a fix has been used.
pub trait LocationProvider: Send + Sync + Debug {
    fn subscribe(&self) -> broadcast::Receiver<LocationFix>;

    fn start_updating(&self);

    fn stop_updating(&self);
}

/// In-process location source backed by a broadcast channel.
///
/// Fixes are pushed with [`publish`](Self::publish). A fixed fix, when set,
/// is published every time updating starts.
#[derive(Debug)]
pub struct BroadcastLocationProvider {
    tx: broadcast::Sender<LocationFix>,
    fixed: Mutex<Option<LocationFix>>,
    updating: AtomicBool,
}

impl Default for BroadcastLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastLocationProvider {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self {
            tx,
            fixed: Mutex::new(None),
            updating: AtomicBool::new(false),
        }
    }

    pub fn with_fixed(fix: LocationFix) -> Self {
        let provider = Self::new();
        provider.set_fixed(Some(fix));
        provider
    }

    pub fn set_fixed(&self, fix: Option<LocationFix>) {
        *self.fixed.lock() = fix;
    }

    /// Returns the number of listeners that received the fix.
    pub fn publish(&self, fix: LocationFix) -> usize {
        self.tx.send(fix).unwrap_or(0)
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }
}

impl LocationProvider for BroadcastLocationProvider {
    fn subscribe(&self) -> broadcast::Receiver<LocationFix> {
        self.tx.subscribe()
    }

    fn start_updating(&self) {
        self.updating.store(true, Ordering::SeqCst);
        let fixed = *self.fixed.lock();
        if let Some(fix) = fixed {
            debug!(?fix, "publishing fixed location");
            self.publish(fix);
        }
    }

    fn stop_updating(&self) {
        self.updating.store(false, Ordering::SeqCst);
    }
}
