//! The report orchestrator
//!
//! Drives the end-to-end pipeline:
//! - Delta-based skip: an insignificant change to the patient data reuses
//!   the retained results and backfills the cache under the new input's keys
//! - Per-lens loop: cache lookup, else stream-generate and persist
//! - Best-effort verification per lens
//! - Aggregate metrics with a separate cache entry and neutral fallback
//! - Master snapshot for archival
//!
//! Lenses run strictly sequentially; latency is additive across lenses in
//! exchange for simple failure isolation. Metrics and snapshot run only
//! after every lens has settled.
//!
//! Caller contract: one report generation per orchestrator at a time.
//! Re-entrant invocations for the same logical session are not guarded here
//! and must be serialized by the caller.

use crate::chat::ChatHandle;
use crate::error::PipelineError;
use crate::progress::{LensState, ReportProgress};
use clinsight_cache::{CacheKey, ReportCache};
use clinsight_core::{AnalysisLens, CachedValue, ClinicalMetrics, ReportSnapshot};
use clinsight_llm::{ChatProvider, GenerationError, LensGenerator, Verifier};
use futures::StreamExt;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Version tag mixed into the aggregate-metrics cache key.
pub const METRICS_VERSION: &str = "METRICS_V1";

/// Version tag mixed into the master-snapshot cache key.
pub const MASTER_SNAPSHOT_VERSION: &str = "MASTER_SNAPSHOT_V1";

/// Fixed section text shown when generation for a lens fails.
pub const FAILED_SECTION_PLACEHOLDER: &str =
    "This section could not be generated. The rest of the report is unaffected; \
     regenerate the report to retry.";

/// Retained state that survives across runs: the last input that completed a
/// full pass (or an explicit skip decision) and the results it produced.
#[derive(Debug, Default)]
struct SessionState {
    last_input: Option<String>,
    last_results: Option<BTreeMap<AnalysisLens, String>>,
}

/// The multi-stage report orchestrator.
pub struct ReportOrchestrator {
    generator: Arc<dyn LensGenerator>,
    verifier: Arc<dyn Verifier>,
    chat_provider: Arc<dyn ChatProvider>,
    cache: ReportCache,
    session: Mutex<SessionState>,
    progress: watch::Sender<ReportProgress>,
}

impl ReportOrchestrator {
    /// Create an orchestrator over the given providers and cache.
    #[must_use]
    pub fn new(
        generator: Arc<dyn LensGenerator>,
        verifier: Arc<dyn Verifier>,
        chat_provider: Arc<dyn ChatProvider>,
        cache: ReportCache,
    ) -> Self {
        let (progress, _) = watch::channel(ReportProgress::idle());
        Self {
            generator,
            verifier,
            chat_provider,
            cache,
            session: Mutex::new(SessionState::default()),
            progress,
        }
    }

    /// Observe pipeline progress. Partial per-lens text is published while
    /// streaming, before the run completes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReportProgress> {
        self.progress.subscribe()
    }

    /// The cache backing this orchestrator.
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    /// Generate the comprehensive report for the given patient data.
    ///
    /// Returns the per-lens text mapping. Individual lens failures are
    /// contained (the lens gets [`FAILED_SECTION_PLACEHOLDER`]); only
    /// failures outside that boundary surface as [`PipelineError`], in which
    /// case the retained last-known-good state is left untouched.
    ///
    /// # Errors
    /// See [`PipelineError`].
    pub async fn generate_comprehensive_report(
        &self,
        patient_data: &str,
    ) -> Result<BTreeMap<AnalysisLens, String>, PipelineError> {
        let mut session = self.session.lock().await;
        self.progress.send_replace(ReportProgress::loading());

        if let Some(previous) = session.last_input.clone() {
            match self
                .generator
                .detect_clinical_changes(&previous, patient_data)
                .await
            {
                Ok(false) => {
                    info!("no significant clinical change; reusing retained report");
                    session.last_input = Some(patient_data.to_string());
                    if let Some(results) = session.last_results.clone() {
                        self.refresh_cached_sections(&results, patient_data).await;
                        let metrics = self.compute_metrics(&Self::full_report_text(&results)).await;
                        self.publish_reused_results(&results, metrics);
                        return Ok(results);
                    }
                    // No retained results to reuse; fall through to a full
                    // run, which will mostly resolve from the cache.
                }
                Ok(true) => debug!("significant clinical change detected"),
                Err(e) => {
                    // Fail open: an unavailable change detector must not
                    // block report generation.
                    warn!(error = %e, "change detection failed; running full generation");
                }
            }
        }

        match self.run_pipeline(patient_data).await {
            Ok(results) => {
                session.last_input = Some(patient_data.to_string());
                session.last_results = Some(results.clone());
                self.progress.send_modify(|p| p.loading = false);
                Ok(results)
            }
            Err(e) => {
                warn!(error = %e, "pipeline failed outside per-lens isolation");
                self.progress.send_modify(|p| {
                    p.loading = false;
                    p.error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Fetch the archival master snapshot for a full report text, if one was
    /// persisted.
    pub async fn cached_snapshot(&self, full_text: &str) -> Option<ReportSnapshot> {
        let key = match CacheKey::derive(&[json!(full_text), json!(MASTER_SNAPSHOT_VERSION)]) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "snapshot key derivation failed");
                return None;
            }
        };
        self.cache
            .get(&key)
            .await
            .and_then(|v| v.as_snapshot().cloned())
    }

    /// Start a chat session seeded with the patient data and the fixed
    /// persona instruction. Session setup is lazy; provider failures become
    /// transcript entries rather than terminating the handle.
    #[must_use]
    pub fn start_chat_session(&self, patient_data: &str) -> ChatHandle {
        ChatHandle::new(Arc::clone(&self.chat_provider), patient_data.to_string())
    }

    /// Concatenate per-lens sections into the full report text used for
    /// metrics and snapshot keys.
    #[must_use]
    pub fn full_report_text(results: &BTreeMap<AnalysisLens, String>) -> String {
        let mut full = String::new();
        for lens in AnalysisLens::ALL {
            if let Some(text) = results.get(&lens) {
                if !full.is_empty() {
                    full.push_str("\n\n");
                }
                full.push_str("## ");
                full.push_str(lens.title());
                full.push_str("\n\n");
                full.push_str(text);
            }
        }
        full
    }

    /// The cache key for one lens under the given patient data.
    fn lens_key(patient_data: &str, lens: AnalysisLens) -> Result<CacheKey, PipelineError> {
        Ok(CacheKey::derive(&[
            json!(patient_data),
            json!(lens.system_instruction()),
            json!(lens.title()),
        ])?)
    }

    /// The full sequential pipeline: four lenses, then metrics, then the
    /// master snapshot.
    async fn run_pipeline(
        &self,
        patient_data: &str,
    ) -> Result<BTreeMap<AnalysisLens, String>, PipelineError> {
        let mut results = BTreeMap::new();

        for lens in AnalysisLens::ALL {
            let key = Self::lens_key(patient_data, lens)?;
            match self.resolve_lens(lens, patient_data, &key).await {
                Ok(text) => {
                    self.verify_lens(lens, &text, patient_data).await;
                    results.insert(lens, text);
                }
                Err(e) => {
                    warn!(lens = %lens, error = %e, "lens failed; substituting placeholder");
                    self.update_lens(lens, |lp| {
                        lp.state = LensState::Failed;
                        lp.text = FAILED_SECTION_PLACEHOLDER.to_string();
                    });
                    results.insert(lens, FAILED_SECTION_PLACEHOLDER.to_string());
                }
            }
        }

        let full_text = Self::full_report_text(&results);
        let metrics = self.compute_metrics(&full_text).await;
        self.progress.send_modify(|p| p.metrics = Some(metrics));
        self.persist_snapshot(&full_text, &results, metrics).await;

        Ok(results)
    }

    /// Resolve one lens: cache hit, or stream a fresh generation.
    async fn resolve_lens(
        &self,
        lens: AnalysisLens,
        patient_data: &str,
        key: &CacheKey,
    ) -> Result<String, GenerationError> {
        if let Some(value) = self.cache.get(key).await {
            if let Some(text) = value.as_text() {
                info!(lens = %lens, key = %key.short(), "lens served from cache");
                let text = text.to_string();
                self.update_lens(lens, |lp| {
                    lp.state = LensState::CachedHit;
                    lp.text = text.clone();
                });
                return Ok(text);
            }
            // A non-text payload under a lens key means the entry was
            // written by something else; regenerate rather than trust it.
            warn!(lens = %lens, "cached payload shape mismatch; regenerating");
        }
        self.generate_lens(lens, patient_data, key).await
    }

    /// Stream-generate one lens, publishing partial text per chunk, and
    /// persist the final text.
    async fn generate_lens(
        &self,
        lens: AnalysisLens,
        patient_data: &str,
        key: &CacheKey,
    ) -> Result<String, GenerationError> {
        info!(lens = %lens, "generating section");
        let mut stream = self
            .generator
            .generate_report_stream(patient_data, lens, lens.system_instruction())
            .await?;

        let mut accumulated = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            accumulated.push_str(&chunk);
            let partial = accumulated.clone();
            self.update_lens(lens, move |lp| {
                lp.state = LensState::Streaming;
                lp.text = partial;
            });
        }

        // A persist failure costs only this cache entry, not the section.
        if let Err(e) = self
            .cache
            .set(key, &CachedValue::Text(accumulated.clone()))
            .await
        {
            warn!(lens = %lens, error = %e, "failed to persist section");
        }
        self.update_lens(lens, |lp| lp.state = LensState::Persisted);
        Ok(accumulated)
    }

    /// Best-effort verification for one lens. A failure logs, restores the
    /// lens's prior state, and leaves its verification result unset.
    async fn verify_lens(&self, lens: AnalysisLens, text: &str, patient_data: &str) {
        let prior = self
            .progress
            .borrow()
            .lenses
            .get(&lens)
            .map(|lp| lp.state)
            .unwrap_or(LensState::Persisted);
        self.update_lens(lens, |lp| lp.state = LensState::VerifyPending);

        match self.verifier.verify_section(lens, text, patient_data).await {
            Ok(result) => {
                debug!(lens = %lens, status = ?result.status, "section verified");
                self.update_lens(lens, move |lp| {
                    lp.verification = Some(result);
                    lp.state = LensState::Verified;
                });
            }
            Err(e) => {
                warn!(lens = %lens, error = %e, "verification failed; result stays unset");
                self.update_lens(lens, move |lp| lp.state = prior);
            }
        }
    }

    /// Aggregate metrics for the full report, cached separately. Never
    /// fails: any miss, provider error, or out-of-range payload falls back
    /// to the neutral default.
    async fn compute_metrics(&self, full_text: &str) -> ClinicalMetrics {
        let key = match CacheKey::derive(&[json!(full_text), json!(METRICS_VERSION)]) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "metrics key derivation failed; using neutral metrics");
                return ClinicalMetrics::neutral();
            }
        };

        if let Some(metrics) = self.cache.get(&key).await.and_then(|v| v.as_metrics()) {
            if metrics.validate().is_ok() {
                debug!("metrics served from cache");
                return metrics;
            }
            warn!("cached metrics out of range; regenerating");
        }

        match self.generator.generate_metrics(full_text).await {
            Ok(metrics) => match metrics.validate() {
                Ok(()) => {
                    if let Err(e) = self.cache.set(&key, &metrics.into()).await {
                        warn!(error = %e, "failed to cache metrics");
                    }
                    metrics
                }
                Err(range) => {
                    warn!(error = %range, "metrics out of range; using neutral defaults");
                    ClinicalMetrics::neutral()
                }
            },
            Err(e) => {
                warn!(error = %e, "metrics generation failed; using neutral defaults");
                ClinicalMetrics::neutral()
            }
        }
    }

    /// Persist the archival master snapshot. Best-effort: a failure costs
    /// only the snapshot entry.
    async fn persist_snapshot(
        &self,
        full_text: &str,
        results: &BTreeMap<AnalysisLens, String>,
        metrics: ClinicalMetrics,
    ) {
        let key = match CacheKey::derive(&[json!(full_text), json!(MASTER_SNAPSHOT_VERSION)]) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "snapshot key derivation failed");
                return;
            }
        };
        let snapshot = ReportSnapshot::new(results.clone(), metrics);
        if let Err(e) = self.cache.set(&key, &snapshot.into()).await {
            warn!(error = %e, "failed to persist master snapshot");
        } else {
            info!(key = %key.short(), "master snapshot persisted");
        }
    }

    /// Backfill the cache after a skip decision: store the retained text
    /// under keys derived from the new input, so future lookups with that
    /// input hit without regeneration.
    async fn refresh_cached_sections(
        &self,
        results: &BTreeMap<AnalysisLens, String>,
        patient_data: &str,
    ) {
        for (lens, text) in results {
            match Self::lens_key(patient_data, *lens) {
                Ok(key) => {
                    if let Err(e) = self.cache.set(&key, &CachedValue::Text(text.clone())).await {
                        warn!(lens = %lens, error = %e, "cache backfill failed");
                    }
                }
                Err(e) => warn!(lens = %lens, error = %e, "backfill key derivation failed"),
            }
        }
    }

    /// Publish the retained results as the current progress after a skip
    /// decision.
    fn publish_reused_results(
        &self,
        results: &BTreeMap<AnalysisLens, String>,
        metrics: ClinicalMetrics,
    ) {
        self.progress.send_modify(|p| {
            for (lens, text) in results {
                if let Some(lp) = p.lenses.get_mut(lens) {
                    lp.state = LensState::CachedHit;
                    lp.text = text.clone();
                }
            }
            p.metrics = Some(metrics);
            p.loading = false;
        });
    }

    /// Apply a mutation to one lens's progress and publish the new snapshot.
    fn update_lens<F>(&self, lens: AnalysisLens, mutate: F)
    where
        F: FnOnce(&mut crate::progress::LensProgress),
    {
        self.progress.send_modify(|p| {
            if let Some(lp) = p.lenses.get_mut(&lens) {
                mutate(lp);
            }
        });
    }
}

impl std::fmt::Debug for ReportOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportOrchestrator")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
