use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::model::{QueryKey, QueryRequest, WeatherResult};

/// Last successful result per text query. Lives as long as the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: Arc<RwLock<HashMap<QueryKey, WeatherResult>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &QueryKey) -> Option<WeatherResult> {
        self.entries.read().get(key).cloned()
    }

    /// Last write wins.
    pub fn store(&self, key: QueryKey, value: WeatherResult) {
        self.entries.write().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Value to show when `request` failed for good: the cached result for
    /// text queries when there is one, the empty result otherwise.
    pub fn fallback_for(&self, request: &QueryRequest) -> WeatherResult {
        request
            .cache_key()
            .and_then(|key| self.lookup(&key))
            .unwrap_or_else(WeatherResult::empty)
    }
}
