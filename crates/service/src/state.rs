//! Shared Application State
//!
//! Serializes rebuilds and keeps the reporting state exposed by the API.

use crate::auth::RebuildAuth;
use crate::rebuild::{RebuildError, Rebuilder};
use airdrop_claims::RebuildResult;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Results kept per round for `/rounds/{round}` (one week of hourly rounds)
pub const ROUNDS_KEPT: u64 = 168;

/// Last hard failure
#[derive(Debug, Clone, Serialize)]
pub struct LastError {
    pub kind: &'static str,
    pub message: String,
    pub at_unix: u64,
}

/// Outcome of a trigger attempt
#[derive(Debug)]
pub enum Trigger {
    /// Another rebuild holds the lock
    Busy,
    Finished(Result<RebuildResult, RebuildError>),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    rebuilder: Rebuilder,
    auth: RebuildAuth,
    /// Held for the duration of one rebuild
    running: Mutex<()>,
    last_result: RwLock<Option<RebuildResult>>,
    last_error: RwLock<Option<LastError>>,
    /// Last run ended in a hard failure
    degraded: AtomicBool,
    runs_by_reason: DashMap<&'static str, u64>,
    results_by_round: DashMap<u64, RebuildResult>,
    failures: AtomicU64,
    start_time: std::time::Instant,
}

impl AppState {
    #[must_use]
    pub fn new(rebuilder: Rebuilder, auth: RebuildAuth) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                rebuilder,
                auth,
                running: Mutex::new(()),
                last_result: RwLock::new(None),
                last_error: RwLock::new(None),
                degraded: AtomicBool::new(false),
                runs_by_reason: DashMap::new(),
                results_by_round: DashMap::new(),
                failures: AtomicU64::new(0),
                start_time: std::time::Instant::now(),
            }),
        }
    }

    /// Check the credentials presented on a rebuild trigger.
    #[must_use]
    pub fn authorized(&self, bearer: Option<&str>, signature: Option<&str>, body: &[u8]) -> bool {
        self.inner.auth.authorize(bearer, signature, body)
    }

    /// Run a rebuild unless one is already in progress.
    pub async fn trigger(&self) -> Trigger {
        let Ok(_guard) = self.inner.running.try_lock() else {
            return Trigger::Busy;
        };
        Trigger::Finished(self.execute().await)
    }

    /// Run a rebuild, waiting for any rebuild in progress to finish.
    pub async fn run_queued(&self) -> Result<RebuildResult, RebuildError> {
        let _guard = self.inner.running.lock().await;
        self.execute().await
    }

    async fn execute(&self) -> Result<RebuildResult, RebuildError> {
        let result = self.inner.rebuilder.run().await;
        self.record(&result);
        result
    }

    /// Fold one rebuild outcome into the reporting state.
    pub fn record(&self, result: &Result<RebuildResult, RebuildError>) {
        match result {
            Ok(result) => {
                *self
                    .inner
                    .runs_by_reason
                    .entry(result.reason.as_str())
                    .or_insert(0) += 1;
                self.inner
                    .results_by_round
                    .insert(result.round, result.clone());
                let oldest = result.round.saturating_sub(ROUNDS_KEPT);
                self.inner.results_by_round.retain(|round, _| *round > oldest);

                *self.inner.last_result.write() = Some(result.clone());
                self.inner.degraded.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                self.inner.failures.fetch_add(1, Ordering::Relaxed);
                *self.inner.last_error.write() = Some(LastError {
                    kind: e.kind(),
                    message: e.to_string(),
                    at_unix: unix_now(),
                });
                self.inner.degraded.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Healthy unless the last rebuild was a hard failure
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !self.inner.degraded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.try_lock().is_err()
    }

    /// Get uptime in seconds
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    /// Successful runs by reason
    #[must_use]
    pub fn runs_by_reason(&self) -> BTreeMap<String, u64> {
        self.inner
            .runs_by_reason
            .iter()
            .map(|entry| ((*entry.key()).to_string(), *entry.value()))
            .collect()
    }

    #[must_use]
    pub fn last_result(&self) -> Option<RebuildResult> {
        self.inner.last_result.read().clone()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<LastError> {
        self.inner.last_error.read().clone()
    }

    #[must_use]
    pub fn result_for_round(&self, round: u64) -> Option<RebuildResult> {
        self.inner
            .results_by_round
            .get(&round)
            .map(|r| r.value().clone())
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
