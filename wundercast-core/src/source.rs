//! Turns raw presentation events into request descriptors.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::{
    location::LocationProvider,
    model::{LocationFix, QueryRequest},
    pipeline::GeoSettings,
};

#[derive(Debug, Clone)]
pub struct RequestSource {
    location: Arc<dyn LocationProvider>,
    geo: GeoSettings,
    /// Location searches still waiting for a fix.
    pending: Arc<AtomicUsize>,
}

impl RequestSource {
    pub fn new(location: Arc<dyn LocationProvider>, geo: GeoSettings) -> Self {
        Self {
            location,
            geo,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Text path: blank submissions produce nothing.
    pub fn text_request(&self, raw: &str) -> Option<QueryRequest> {
        let request = QueryRequest::text(raw);
        if request.is_none() {
            debug!("ignoring blank submission");
        }
        request
    }

    /// Geo path: starts location updates now and resolves with one request
    /// built from the first fix accurate enough.
    ///
    /// Without a configured timeout the future never resolves if no such fix
    /// arrives. On timeout it resolves to `None`.
    pub fn locate(&self) -> impl Future<Output = Option<QueryRequest>> + Send + use<> {
        // Subscribe before starting so an immediate fix is not missed.
        let mut fixes = self.location.subscribe();
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.location.start_updating();

        let location = self.location.clone();
        let pending = self.pending.clone();
        let geo = self.geo;

        async move {
            let wait = first_accurate_fix(&mut fixes, geo.accuracy_threshold);
            let fix = match geo.fix_timeout {
                Some(limit) => match tokio::time::timeout(limit, wait).await {
                    Ok(fix) => fix,
                    Err(_) => {
                        warn!(?limit, "no accurate location fix in time");
                        None
                    }
                },
                None => wait.await,
            };

            if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                location.stop_updating();
            }

            fix.map(|fix| {
                info!(coordinates = %fix.coordinates, "location acquired");
                QueryRequest::geo(fix.coordinates)
            })
        }
    }
}

async fn first_accurate_fix(
    fixes: &mut broadcast::Receiver<LocationFix>,
    threshold: f64,
) -> Option<LocationFix> {
    loop {
        match fixes.recv().await {
            // Negative or NaN accuracy marks an invalid fix.
            Ok(fix) if (0.0..=threshold).contains(&fix.horizontal_accuracy) => return Some(fix),
            Ok(fix) => debug!(accuracy = fix.horizontal_accuracy, "discarding inaccurate fix"),
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "location fixes lagged"),
            Err(RecvError::Closed) => return None,
        }
    }
}
