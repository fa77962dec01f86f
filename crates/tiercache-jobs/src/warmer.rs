//! Scheduled cache warming.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tiercache_config::WarmerConfig;
use tiercache_core::{CacheError, CacheResult, Namespace};
use tiercache_service::metrics::CacheMetrics;
use tiercache_service::CacheOrchestrator;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A key worth having in the cache before anyone asks for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmCandidate {
    pub namespace: Namespace,
    pub entity_id: String,
    pub attribute: Option<String>,
}

impl WarmCandidate {
    pub fn new(namespace: Namespace, entity_id: impl Into<String>, attribute: Option<&str>) -> Self {
        Self {
            namespace,
            entity_id: entity_id.into(),
            attribute: attribute.map(str::to_string),
        }
    }
}

/// Application-supplied candidates and loaders.
#[async_trait]
pub trait WarmingSource: Send + Sync {
    /// At most `limit` candidates, highest value first (top active leads,
    /// active campaign analytics, recent AI responses).
    async fn candidates(&self, limit: usize) -> anyhow::Result<Vec<WarmCandidate>>;

    /// Loads the value for one candidate from the source of truth.
    async fn load(&self, candidate: &WarmCandidate) -> anyhow::Result<serde_json::Value>;
}

/// Outcome of one warming pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmingReport {
    pub attempted: usize,
    /// Candidates present in the cache after the pass.
    pub warmed: usize,
    pub failed: usize,
    /// Candidates in a namespace that is never cached.
    pub skipped: usize,
}

#[derive(Debug, thiserror::Error)]
enum WarmError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("load failed: {0:#}")]
    Load(anyhow::Error),
}

enum Outcome {
    Warmed,
    Failed,
    Skipped,
}

/// Periodically warms the cache from a [`WarmingSource`].
pub struct CacheWarmer {
    id: String,
    cache: Arc<CacheOrchestrator>,
    source: Arc<dyn WarmingSource>,
    config: WarmerConfig,
    shutdown_tx: broadcast::Sender<()>,
    stop_requested: AtomicBool,
    running: AtomicBool,
}

impl CacheWarmer {
    pub fn new(cache: Arc<CacheOrchestrator>, source: Arc<dyn WarmingSource>, config: WarmerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            id: format!("warmer-{}", Uuid::new_v4()),
            cache,
            source,
            config,
            shutdown_tx,
            stop_requested: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs one pass over the current candidates.
    ///
    /// Individual candidate failures are counted, never raised. Only a
    /// failure to list candidates is an error.
    pub async fn warm_once(&self) -> CacheResult<WarmingReport> {
        let started = Instant::now();
        let limit = self.config.max_candidates;
        let mut candidates = self.source.candidates(limit).await?;
        candidates.truncate(limit);

        let outcomes: Vec<Outcome> = stream::iter(candidates)
            .map(|candidate| self.warm_candidate(candidate))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = WarmingReport {
            attempted: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Warmed => report.warmed += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Skipped => report.skipped += 1,
            }
        }

        info!(
            warmer_id = %self.id,
            attempted = report.attempted,
            warmed = report.warmed,
            failed = report.failed,
            skipped = report.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache warming pass complete"
        );
        Ok(report)
    }

    async fn warm_candidate(&self, candidate: WarmCandidate) -> Outcome {
        let source = &self.source;
        let target = &candidate;
        let result = self
            .cache
            .get_or_compute(
                candidate.namespace,
                &candidate.entity_id,
                candidate.attribute.as_deref(),
                move || async move { source.load(target).await.map_err(WarmError::Load) },
            )
            .await;

        let outcome = match result {
            Ok(_) => Outcome::Warmed,
            Err(WarmError::Cache(CacheError::NamespaceNotCacheable(_))) => {
                debug!(namespace = %candidate.namespace, entity_id = %candidate.entity_id, "Skipping non-cacheable candidate");
                Outcome::Skipped
            }
            Err(e) => {
                warn!(
                    namespace = %candidate.namespace,
                    entity_id = %candidate.entity_id,
                    error = %e,
                    "Failed to warm candidate"
                );
                Outcome::Failed
            }
        };

        CacheMetrics::warm_candidate(match outcome {
            Outcome::Warmed => "warmed",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        });
        outcome
    }

    /// Warms on every tick of the configured interval until [`stop`](Self::stop).
    ///
    /// The first pass runs immediately.
    pub async fn run(&self) -> CacheResult<()> {
        if !self.config.enabled {
            info!(warmer_id = %self.id, "Cache warmer disabled");
            return Ok(());
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CacheError::Configuration("Cache warmer already running".to_string()));
        }

        info!(
            warmer_id = %self.id,
            interval_secs = self.config.interval_secs,
            max_candidates = self.config.max_candidates,
            "Starting cache warmer"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // A stop sent before the subscription above is only visible here.
        while !self.stop_requested.load(Ordering::SeqCst) {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!(warmer_id = %self.id, "Received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.warm_once().await {
                        error!(warmer_id = %self.id, error = %e, "Failed to list warm candidates");
                    }
                }
            }
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        info!(warmer_id = %self.id, "Cache warmer stopped");

        Ok(())
    }

    /// Signals the warmer to stop after its current pass.
    ///
    /// A stop issued before [`run`](Self::run) starts makes that run return
    /// without warming.
    pub fn stop(&self) {
        info!(warmer_id = %self.id, "Stopping cache warmer");
        self.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }
}
