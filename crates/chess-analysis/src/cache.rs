//! Evaluation cache with single-flight computation.
//!
//! Each key is in one of three states: absent, pending (one caller is
//! computing it, everyone else subscribes to a watch channel), or ready.
//! Failed and abandoned computations leave the key absent again.

use crate::config::LimitProfile;
use crate::engine::EngineError;
use crate::evaluation::Evaluation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

/// Identity of a cached evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: String,
    pub limit: LimitProfile,
}

type FlightResult = Option<Result<Evaluation, EngineError>>;

enum Entry {
    Ready(Evaluation),
    Pending(watch::Receiver<FlightResult>),
}

enum Claim<'a> {
    Hit(Evaluation),
    Wait(watch::Receiver<FlightResult>),
    Lead(Flight<'a>),
}

/// Counters describing how the cache was used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from a stored evaluation.
    pub hits: u64,
    /// Lookups that started a computation.
    pub misses: u64,
    /// Lookups that joined a computation already in flight.
    pub coalesced: u64,
    /// Evaluations currently stored.
    pub entries: usize,
}

/// Evaluations keyed by position fingerprint and search limit.
#[derive(Default)]
pub struct EvaluationCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached evaluation for `key`, or computes it with
    /// `compute`.
    ///
    /// Concurrent callers with the same key share a single computation. Its
    /// error, if any, is returned to every one of them and nothing is stored.
    /// If the computing caller is dropped, one of the waiters takes over.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> Result<Evaluation, EngineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Evaluation, EngineError>>,
    {
        loop {
            let mut receiver = match self.claim(&key) {
                Claim::Hit(evaluation) => return Ok(evaluation),
                Claim::Lead(flight) => {
                    let result = compute().await;
                    flight.complete(&result);
                    return result;
                }
                Claim::Wait(receiver) => receiver,
            };

            let outcome = match receiver.wait_for(Option::is_some).await {
                Ok(value) => value.clone(),
                Err(_) => None,
            };
            match outcome {
                Some(result) => return result,
                None => debug!(
                    fingerprint = %key.fingerprint,
                    "in-flight evaluation abandoned, retrying"
                ),
            }
        }
    }

    /// Stored evaluation for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<Evaluation> {
        match self.entries().get(key) {
            Some(Entry::Ready(evaluation)) => Some(evaluation.clone()),
            _ => None,
        }
    }

    /// Number of stored evaluations.
    pub fn len(&self) -> usize {
        self.entries()
            .values()
            .filter(|entry| matches!(entry, Entry::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn claim(&self, key: &CacheKey) -> Claim<'_> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(Entry::Ready(evaluation)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Claim::Hit(evaluation.clone())
            }
            Some(Entry::Pending(receiver)) => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                Claim::Wait(receiver.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let (sender, receiver) = watch::channel(None);
                entries.insert(key.clone(), Entry::Pending(receiver));
                Claim::Lead(Flight {
                    cache: self,
                    key: key.clone(),
                    sender: Some(sender),
                })
            }
        }
    }
}

/// The right to compute one key. Dropping it unfinished clears the key.
struct Flight<'a> {
    cache: &'a EvaluationCache,
    key: CacheKey,
    sender: Option<watch::Sender<FlightResult>>,
}

impl Flight<'_> {
    fn complete(mut self, result: &Result<Evaluation, EngineError>) {
        {
            let mut entries = self.cache.entries();
            match result {
                Ok(evaluation) => {
                    entries.insert(self.key.clone(), Entry::Ready(evaluation.clone()));
                }
                Err(_) => {
                    entries.remove(&self.key);
                }
            }
        }
        if let Some(sender) = self.sender.take() {
            sender.send_replace(Some(result.clone()));
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.cache.entries().remove(&self.key);
        }
    }
}
