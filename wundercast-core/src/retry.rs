//! Bounded, classified retries for a single weather lookup.
//!
//! Each failure is classified once. The [`RecoveryTable`] decides how the
//! request waits before the next attempt; [`RetryEngine::execute`] owns the
//! attempt counting.

use std::{collections::HashMap, future::Future, pin::Pin, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    error::{ErrorClass, FetchError, TerminalFailure},
    model::WeatherResult,
    readiness::{ApiKeyStore, ConnectivityMonitor},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations allowed per request, first attempt included.
    pub max_attempts: u32,
    /// Backoff before attempt `a + 1` is `(a + 1) * delay_unit`.
    pub delay_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.delay_unit * (attempt + 1)
    }

    pub fn is_last(&self, attempt: u32) -> bool {
        attempt + 1 >= self.max_attempts
    }
}

/// How a request waits before being re-issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Linear delay on a timer.
    Backoff,
    /// Until a new non-empty API key is supplied.
    AwaitApiKey,
    /// Until connectivity is reported online.
    AwaitConnectivity,
}

#[derive(Debug, Clone)]
pub struct RecoveryTable {
    entries: HashMap<ErrorClass, Recovery>,
}

impl Default for RecoveryTable {
    fn default() -> Self {
        Self::new()
            .with(ErrorClass::InvalidApiKey, Recovery::AwaitApiKey)
            .with(ErrorClass::NoConnectivity, Recovery::AwaitConnectivity)
    }
}

impl RecoveryTable {
    /// An empty table: every class backs off.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with(mut self, class: ErrorClass, recovery: Recovery) -> Self {
        self.entries.insert(class, recovery);
        self
    }

    pub fn recovery_for(&self, class: ErrorClass) -> Recovery {
        self.entries.get(&class).copied().unwrap_or(Recovery::Backoff)
    }
}

type Wait = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Runs one request's attempts strictly in sequence.
#[derive(Debug, Clone)]
pub struct RetryEngine {
    policy: RetryPolicy,
    table: RecoveryTable,
    api_key: ApiKeyStore,
    connectivity: ConnectivityMonitor,
}

impl RetryEngine {
    pub fn new(
        policy: RetryPolicy,
        table: RecoveryTable,
        api_key: ApiKeyStore,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            policy,
            table,
            api_key,
            connectivity,
        }
    }

    /// Invoke `op` until it succeeds or the attempt budget runs out.
    ///
    /// `op` receives the zero-based attempt index. `on_failure` is called
    /// with the class of every failed attempt, the last one included.
    pub async fn execute<F, Fut, N>(
        &self,
        mut op: F,
        mut on_failure: N,
    ) -> Result<WeatherResult, TerminalFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<WeatherResult, FetchError>>,
        N: FnMut(ErrorClass),
    {
        let mut attempt = 0;
        loop {
            let key_used = self.api_key.current();
            let err = match op(attempt).await {
                Ok(result) => return Ok(result),
                Err(err) => err,
            };
            let class = ErrorClass::classify(&err);
            warn!(attempt, %class, error = %err, "weather lookup failed");

            if self.policy.is_last(attempt) {
                on_failure(class);
                return Err(TerminalFailure {
                    class,
                    attempts: attempt + 1,
                });
            }

            // Readiness waits subscribe here, before the user can react to
            // the notification.
            let wait = self.wait_for(class, attempt, &key_used);
            on_failure(class);
            wait.await;
            attempt += 1;
        }
    }

    /// `key_used` is the key held when the failed attempt started; a key
    /// written since then releases an API key wait at once.
    fn wait_for(&self, class: ErrorClass, attempt: u32, key_used: &str) -> Wait {
        match self.table.recovery_for(class) {
            Recovery::Backoff => {
                let delay = self.policy.backoff(attempt);
                debug!(?delay, "retrying after {}ms", delay.as_millis());
                Box::pin(tokio::time::sleep(delay))
            }
            Recovery::AwaitApiKey => {
                info!("waiting for a new API key before retrying");
                Box::pin(self.api_key.wait_for_new_key(key_used))
            }
            Recovery::AwaitConnectivity => {
                info!("waiting for connectivity before retrying");
                Box::pin(self.connectivity.wait_until_online())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ApiError, readiness::Connectivity};
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };
    use tokio::time::Instant;

    fn engine() -> RetryEngine {
        RetryEngine::new(
            RetryPolicy::default(),
            RecoveryTable::default(),
            ApiKeyStore::new("key"),
            ConnectivityMonitor::default(),
        )
    }

    fn sunny() -> WeatherResult {
        WeatherResult::new(18, 50, "☀", "London")
    }

    #[test]
    fn default_policy_backs_off_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(3));
        assert!(!policy.is_last(2));
        assert!(policy.is_last(3));
    }

    #[test]
    fn default_table_dispatches_readiness_classes() {
        let table = RecoveryTable::default();
        assert_eq!(table.recovery_for(ErrorClass::InvalidApiKey), Recovery::AwaitApiKey);
        assert_eq!(table.recovery_for(ErrorClass::NoConnectivity), Recovery::AwaitConnectivity);
        assert_eq!(table.recovery_for(ErrorClass::CityNotFound), Recovery::Backoff);
        assert_eq!(table.recovery_for(ErrorClass::ServerFailure), Recovery::Backoff);
        assert_eq!(table.recovery_for(ErrorClass::Unknown), Recovery::Backoff);
    }

    #[test]
    fn table_entries_can_be_overridden() {
        let table = RecoveryTable::default().with(ErrorClass::InvalidApiKey, Recovery::Backoff);
        assert_eq!(table.recovery_for(ErrorClass::InvalidApiKey), Recovery::Backoff);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_needs_no_retry() {
        let calls = AtomicU32::new(0);
        let mut failures = Vec::new();

        let result = engine()
            .execute(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, FetchError>(sunny()) }
                },
                |class| failures.push(class),
            )
            .await;

        assert_eq!(result, Ok(sunny()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_stops_after_four_attempts() {
        let started = Instant::now();
        let mut seen = Vec::new();
        let mut failures = Vec::new();

        let result = engine()
            .execute(
                |attempt| {
                    seen.push((attempt, started.elapsed()));
                    async { Err::<WeatherResult, _>(FetchError::Api(ApiError::ServerFailure)) }
                },
                |class| failures.push(class),
            )
            .await;

        assert_eq!(
            result,
            Err(TerminalFailure {
                class: ErrorClass::ServerFailure,
                attempts: 4,
            })
        );
        let offsets: Vec<_> = seen.iter().map(|(_, at)| at.as_secs()).collect();
        assert_eq!(offsets, vec![0, 1, 3, 6]);
        assert_eq!(failures, vec![ErrorClass::ServerFailure; 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);

        let result = engine()
            .execute(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 2 {
                            Err(FetchError::Decode("truncated body".into()))
                        } else {
                            Ok(sunny())
                        }
                    }
                },
                |_| {},
            )
            .await;

        assert_eq!(result, Ok(sunny()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_key_waits_for_new_key() {
        let keys = ApiKeyStore::new("bad");
        let engine = RetryEngine::new(
            RetryPolicy::default(),
            RecoveryTable::default(),
            keys.clone(),
            ConnectivityMonitor::default(),
        );
        let calls = Arc::new(AtomicU32::new(0));

        let task = {
            let calls = calls.clone();
            let keys = keys.clone();
            tokio::spawn(async move {
                engine
                    .execute(
                        |_| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            let key = keys.current();
                            async move {
                                if key == "good" {
                                    Ok(sunny())
                                } else {
                                    Err(FetchError::Api(ApiError::InvalidKey))
                                }
                            }
                        },
                        |_| {},
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        keys.set_key("good");
        let result = task.await.expect("retry task");
        assert_eq!(result, Ok(sunny()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn key_replaced_during_attempt_releases_wait() {
        let keys = ApiKeyStore::new("bad");
        let engine = RetryEngine::new(
            RetryPolicy::default(),
            RecoveryTable::default(),
            keys.clone(),
            ConnectivityMonitor::default(),
        );
        let calls = AtomicU32::new(0);

        let result = engine
            .execute(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let key = keys.current();
                    // The user supplies a working key while the request is in flight.
                    keys.set_key("good");
                    async move {
                        if key == "good" {
                            Ok(sunny())
                        } else {
                            Err(FetchError::Api(ApiError::InvalidKey))
                        }
                    }
                },
                |_| {},
            )
            .await;

        assert_eq!(result, Ok(sunny()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_connectivity_waits_until_online() {
        let connectivity = ConnectivityMonitor::new(Connectivity::Offline);
        let engine = RetryEngine::new(
            RetryPolicy::default(),
            RecoveryTable::default(),
            ApiKeyStore::new("key"),
            connectivity.clone(),
        );
        let calls = Arc::new(AtomicU32::new(0));

        let task = {
            let calls = calls.clone();
            tokio::spawn(async move {
                engine
                    .execute(
                        |attempt| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            async move {
                                if attempt == 0 {
                                    Err(FetchError::not_connected("network is unreachable"))
                                } else {
                                    Ok(sunny())
                                }
                            }
                        },
                        |_| {},
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        connectivity.report(Connectivity::Online);
        assert_eq!(task.await.expect("retry task"), Ok(sunny()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_waits_consume_attempts() {
        let keys = ApiKeyStore::new("bad");
        let engine = RetryEngine::new(
            RetryPolicy::default(),
            RecoveryTable::default(),
            keys.clone(),
            ConnectivityMonitor::default(),
        );

        let task = tokio::spawn(async move {
            let mut failures = 0;
            let result = engine
                .execute(
                    |_| async { Err::<WeatherResult, _>(FetchError::Api(ApiError::InvalidKey)) },
                    |_| failures += 1,
                )
                .await;
            (result, failures)
        });

        for key in ["k1", "k2", "k3"] {
            tokio::time::sleep(Duration::from_secs(1)).await;
            keys.set_key(key);
        }

        let (result, failures) = task.await.expect("retry task");
        assert_eq!(
            result,
            Err(TerminalFailure {
                class: ErrorClass::InvalidApiKey,
                attempts: 4,
            })
        );
        assert_eq!(failures, 4);
    }
}
