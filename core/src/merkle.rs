//! Merkle Query Client
//!
//! Read-only access to the relay's commitment tree. Both reads are retried
//! on `Unavailable` only; `CommitmentNotFound` is a definite answer.
//!
//! Membership paths can be kept in a bounded TTL cache. A cached path is
//! only served for the root it was computed against when the caller names
//! one, so a transfer never mixes paths from different tree states.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cipherpay_privacy::{Commitment, Hash32, MerklePath, MerkleRoot};
use log::debug;
use serde::Serialize;

use crate::error::Result;
use crate::relay::Relay;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy)]
pub struct PathCacheConfig {
    pub max_size: usize,
    pub ttl: Duration,
}

impl Default for PathCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl: Duration::from_millis(300_000),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

struct PathCache {
    config: PathCacheConfig,
    entries: HashMap<Commitment, (MerklePath, Instant)>,
    /// Oldest first
    order: VecDeque<Commitment>,
    hits: u64,
    misses: u64,
}

impl PathCache {
    fn new(config: PathCacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, commitment: &Commitment, root: Option<&Hash32>) -> Option<MerklePath> {
        let fresh = match self.entries.get(commitment) {
            Some((path, stored)) => {
                stored.elapsed() < self.config.ttl && root.is_none_or(|r| &path.root == r)
            }
            None => false,
        };
        if !fresh {
            self.remove(commitment);
            self.misses += 1;
            return None;
        }
        self.hits += 1;
        self.entries.get(commitment).map(|(path, _)| path.clone())
    }

    fn put(&mut self, commitment: Commitment, path: MerklePath) {
        if self.config.max_size == 0 {
            return;
        }
        self.remove(&commitment);
        while self.entries.len() >= self.config.max_size {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(commitment.clone());
        self.entries.insert(commitment, (path, Instant::now()));
    }

    fn remove(&mut self, commitment: &Commitment) {
        if self.entries.remove(commitment).is_some() {
            self.order.retain(|c| c != commitment);
        }
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            size: self.entries.len(),
        }
    }
}

pub struct MerkleQueryClient {
    relay: Arc<dyn Relay>,
    retry: RetryPolicy,
    cache: Option<Mutex<PathCache>>,
}

impl MerkleQueryClient {
    pub fn new(relay: Arc<dyn Relay>, retry: RetryPolicy) -> Self {
        Self {
            relay,
            retry,
            cache: None,
        }
    }

    pub fn with_cache(mut self, config: PathCacheConfig) -> Self {
        self.cache = Some(Mutex::new(PathCache::new(config)));
        self
    }

    fn cache(&self) -> Option<std::sync::MutexGuard<'_, PathCache>> {
        self.cache
            .as_ref()
            .map(|c| c.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    pub async fn fetch_root(&self) -> Result<MerkleRoot> {
        self.retry
            .run("fetch merkle root", || self.relay.fetch_root())
            .await
    }

    pub async fn get_path(&self, commitment: &Commitment) -> Result<MerklePath> {
        self.lookup(commitment, None).await
    }

    /// Path computed against `root`; cached paths for other roots are refetched.
    pub async fn get_path_at(&self, commitment: &Commitment, root: &Hash32) -> Result<MerklePath> {
        self.lookup(commitment, Some(root)).await
    }

    async fn lookup(&self, commitment: &Commitment, root: Option<&Hash32>) -> Result<MerklePath> {
        if let Some(path) = self.cache().and_then(|mut c| c.get(commitment, root)) {
            debug!("Path cache hit for {}", commitment);
            return Ok(path);
        }

        let path = self
            .retry
            .run("fetch merkle path", || self.relay.merkle_path(commitment))
            .await?;

        if let Some(mut cache) = self.cache() {
            cache.put(commitment.clone(), path.clone());
        }
        Ok(path)
    }

    /// `None` when caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache().map(|c| c.stats())
    }

    pub fn clear_cache(&self) {
        if let Some(mut cache) = self.cache() {
            cache.entries.clear();
            cache.order.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WalletError;
    use crate::relay::SimulatedRelay;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_secs(1),
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn client_with(relay: Arc<SimulatedRelay>, cache: Option<PathCacheConfig>) -> MerkleQueryClient {
        let client = MerkleQueryClient::new(relay, policy());
        match cache {
            Some(config) => client.with_cache(config),
            None => client,
        }
    }

    #[tokio::test]
    async fn test_unknown_commitment_not_found() {
        let relay = Arc::new(SimulatedRelay::new());
        let client = client_with(relay, None);
        let err = client.get_path(&"0xUNKNOWN".into()).await.unwrap_err();
        assert_eq!(err, WalletError::CommitmentNotFound("0xUNKNOWN".into()));
        assert_eq!(client.cache_stats(), None);
    }

    #[tokio::test]
    async fn test_offline_relay_is_unavailable() {
        let relay = Arc::new(SimulatedRelay::new());
        relay.set_offline(true);
        let client = client_with(relay, None);
        assert!(client.fetch_root().await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_cache_hits_and_misses() {
        let relay = Arc::new(SimulatedRelay::new());
        let c = Commitment::from("0xc1");
        relay.insert_commitment(&c);
        let client = client_with(relay.clone(), Some(PathCacheConfig::default()));

        let first = client.get_path(&c).await.unwrap();
        relay.set_offline(true);
        let second = client.get_path(&c).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            client.cache_stats(),
            Some(CacheStats {
                hits: 1,
                misses: 1,
                size: 1
            })
        );
    }

    #[tokio::test]
    async fn test_cached_path_refetched_for_new_root() {
        let relay = Arc::new(SimulatedRelay::new());
        let c = Commitment::from("0xc1");
        relay.insert_commitment(&c);
        let client = client_with(relay.clone(), Some(PathCacheConfig::default()));
        let old = client.get_path(&c).await.unwrap();

        relay.insert_commitment(&"0xc2".into());
        let root = client.fetch_root().await.unwrap();
        let fresh = client.get_path_at(&c, &root.root).await.unwrap();
        assert_ne!(old.root, fresh.root);
        assert!(fresh.verify(&c, &root.root));
    }

    #[tokio::test]
    async fn test_cache_bounded_and_expiring() {
        let relay = Arc::new(SimulatedRelay::new());
        for id in ["0xa", "0xb", "0xc"] {
            relay.insert_commitment(&id.into());
        }
        let client = client_with(
            relay,
            Some(PathCacheConfig {
                max_size: 2,
                ttl: Duration::from_millis(20),
            }),
        );
        for id in ["0xa", "0xb", "0xc"] {
            client.get_path(&id.into()).await.unwrap();
        }
        assert_eq!(client.cache_stats().unwrap().size, 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        client.get_path(&"0xc".into()).await.unwrap();
        let stats = client.cache_stats().unwrap();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 4);
    }
}
