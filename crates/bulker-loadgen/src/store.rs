use crate::config::StoreConfig;
use crate::telemetry::{increment_handler_calls, record_batch_size};
use bulker::{BatchHandler, Outputs};
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("SKU {0} is not stocked")]
    InvalidSku(u64),
}

/// A simulated bulk inventory store.
///
/// Every call bumps the stock version of each SKU it touches and returns the
/// new versions. A call costs a fixed latency plus a per-item latency, and a
/// call containing any invalid SKU fails as a whole, like a bulk statement
/// that aborts on its first bad row.
#[derive(Debug)]
pub struct InventoryStore {
    config: StoreConfig,
    versions: Mutex<HashMap<u64, u64>>,
    calls: AtomicU64,
}

impl InventoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            versions: Mutex::new(HashMap::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Number of bulk calls served, including failed ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn is_invalid(&self, sku: u64) -> bool {
        self.config
            .invalid_every
            .is_some_and(|every| sku % every == 0)
    }
}

impl BatchHandler for InventoryStore {
    type Input = u64;
    type Output = u64;
    type Error = StoreError;

    #[tracing::instrument(level = "trace", skip_all, fields(items = skus.len()))]
    async fn handle(&self, skus: &[u64]) -> Result<Outputs<u64, u64>, StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        increment_handler_calls();
        record_batch_size(skus.len() as f64);

        let latency = self.config.call_latency + self.config.item_latency * skus.len() as u32;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(sku) = skus.iter().copied().find(|sku| self.is_invalid(*sku)) {
            tracing::debug!(sku, items = skus.len(), "Bulk call rejected");
            return Err(StoreError::InvalidSku(sku));
        }

        let mut versions = self.versions.lock();
        Ok(skus
            .iter()
            .map(|sku| {
                let version = versions.entry(*sku).or_default();
                *version += 1;
                (*sku, *version)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    fn store(invalid_every: Option<u64>) -> InventoryStore {
        InventoryStore::new(StoreConfig {
            invalid_every,
            call_latency: Duration::from_millis(5),
            item_latency: Duration::from_micros(10),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn bumps_versions_per_call() {
        let store = store(None);

        let first = store.handle(&[1, 2]).await.unwrap();
        assert_eq!(first, HashMap::from([(1, 1), (2, 1)]));

        let second = store.handle(&[2, 3]).await.unwrap();
        assert_eq!(second, HashMap::from([(2, 2), (3, 1)]));
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_sku_fails_whole_call() {
        let store = store(Some(5));

        let err = store.handle(&[1, 10, 15]).await.unwrap_err();
        assert_eq!(err, StoreError::InvalidSku(10));

        // Nothing from the failed call was applied.
        let ok = store.handle(&[1]).await.unwrap();
        assert_eq!(ok[&1], 1);
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_scales_with_items() {
        let store = store(None);
        let start = tokio::time::Instant::now();
        let skus: Vec<u64> = (1..=100).collect();

        store.handle(&skus).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(6));
    }
}
