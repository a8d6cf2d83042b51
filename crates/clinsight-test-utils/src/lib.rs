//! Testing utilities for the Clinsight workspace
//!
//! Scripted provider fakes, cache fixtures, and logging setup shared by
//! pipeline tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use clinsight_cache::{CacheConfig, KeyMaterial, ReportCache};
use clinsight_core::{AnalysisLens, ClinicalMetrics, VerificationResult};
use clinsight_llm::{
    ChatError, ChatProvider, ChatSession, GenerationError, LensGenerator, MetricsError,
    SectionStream, VerificationError, Verifier,
};
use once_cell::sync::OnceCell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Initialize test logging once per process. Safe to call from every test.
pub fn init_test_logging() {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Key material every test fixture shares.
pub fn test_key_material() -> KeyMaterial {
    KeyMaterial::new("clinsight-test-passphrase", b"clinsight-test-salt".to_vec())
}

/// Open a fresh cache in a temp directory. Keep the `TempDir` alive for the
/// duration of the test.
pub fn temp_cache() -> (TempDir, ReportCache) {
    let dir = TempDir::new().expect("temp dir");
    let cache = ReportCache::open(
        CacheConfig::new(dir.path(), test_key_material()).with_max_entries(50),
    )
    .expect("open cache");
    (dir, cache)
}

/// What the scripted generator does for one lens.
#[derive(Debug, Clone)]
pub enum SectionScript {
    /// Yield these chunks in order, then end cleanly.
    Chunks(Vec<String>),
    /// Fail before any chunk is produced.
    FailOpen(String),
    /// Yield these chunks, then fail mid-stream.
    FailMidStream(Vec<String>, String),
}

/// A deterministic [`LensGenerator`] driven by per-lens scripts, with call
/// counters for asserting skip/short-circuit behavior.
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<AnalysisLens, SectionScript>>,
    metrics: Mutex<Result<ClinicalMetrics, String>>,
    significant: AtomicBool,
    fail_change_detection: AtomicBool,
    pub stream_calls: AtomicUsize,
    pub metrics_calls: AtomicUsize,
    pub change_calls: AtomicUsize,
}

impl ScriptedGenerator {
    /// Every lens yields one chunk: `"{title} section"`. Changes are
    /// significant, metrics are a fixed valid value.
    pub fn new() -> Self {
        let scripts = AnalysisLens::ALL
            .into_iter()
            .map(|lens| {
                (
                    lens,
                    SectionScript::Chunks(vec![format!("{} section", lens.title())]),
                )
            })
            .collect();
        Self {
            scripts: Mutex::new(scripts),
            metrics: Mutex::new(Ok(ClinicalMetrics::new(4.0, 6.0, 7.0))),
            significant: AtomicBool::new(true),
            fail_change_detection: AtomicBool::new(false),
            stream_calls: AtomicUsize::new(0),
            metrics_calls: AtomicUsize::new(0),
            change_calls: AtomicUsize::new(0),
        }
    }

    /// Every lens yields the same single chunk.
    pub fn uniform(text: &str) -> Self {
        let generator = Self::new();
        for lens in AnalysisLens::ALL {
            generator.script(lens, SectionScript::Chunks(vec![text.to_string()]));
        }
        generator
    }

    /// Replace the script for one lens.
    pub fn script(&self, lens: AnalysisLens, script: SectionScript) {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(lens, script);
    }

    /// Set what `detect_clinical_changes` reports.
    pub fn set_significant(&self, significant: bool) {
        self.significant.store(significant, Ordering::SeqCst);
    }

    /// Make `detect_clinical_changes` fail.
    pub fn fail_change_detection(&self) {
        self.fail_change_detection.store(true, Ordering::SeqCst);
    }

    /// Set what `generate_metrics` returns (Err string becomes a provider
    /// error).
    pub fn set_metrics(&self, metrics: Result<ClinicalMetrics, &str>) {
        *self.metrics.lock().expect("metrics lock") = metrics.map_err(str::to_string);
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LensGenerator for ScriptedGenerator {
    async fn generate_report_stream(
        &self,
        _patient_data: &str,
        lens: AnalysisLens,
        _system_instruction: &str,
    ) -> Result<SectionStream, GenerationError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get(&lens)
            .cloned()
            .unwrap_or_else(|| SectionScript::Chunks(vec![String::new()]));

        let items: Vec<Result<String, GenerationError>> = match script {
            SectionScript::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            SectionScript::FailOpen(message) => {
                return Err(GenerationError::Provider(message));
            }
            SectionScript::FailMidStream(chunks, message) => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(GenerationError::StreamInterrupted(
                    message,
                ))))
                .collect(),
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn generate_metrics(
        &self,
        _report_text: &str,
    ) -> Result<ClinicalMetrics, MetricsError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.metrics
            .lock()
            .expect("metrics lock")
            .clone()
            .map_err(MetricsError::Provider)
    }

    async fn detect_clinical_changes(
        &self,
        _previous: &str,
        _current: &str,
    ) -> Result<bool, GenerationError> {
        self.change_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_change_detection.load(Ordering::SeqCst) {
            return Err(GenerationError::Provider(
                "change detector unavailable".to_string(),
            ));
        }
        Ok(self.significant.load(Ordering::SeqCst))
    }
}

/// A verifier that always returns the same result.
pub struct StaticVerifier {
    result: VerificationResult,
    pub calls: AtomicUsize,
}

impl StaticVerifier {
    pub fn verified() -> Self {
        Self {
            result: VerificationResult::verified(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_result(result: VerificationResult) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Verifier for StaticVerifier {
    async fn verify_section(
        &self,
        _lens: AnalysisLens,
        _content: &str,
        _source_data: &str,
    ) -> Result<VerificationResult, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// A verifier whose every call fails.
#[derive(Default)]
pub struct FailingVerifier {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Verifier for FailingVerifier {
    async fn verify_section(
        &self,
        _lens: AnalysisLens,
        _content: &str,
        _source_data: &str,
    ) -> Result<VerificationResult, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(VerificationError("verifier offline".to_string()))
    }
}

/// Shared script for chat sessions: a greeting plus a queue of replies.
/// `Err` entries simulate provider failures for one call. Sessions share
/// the provider's reply queue, so tests can steer a session after it has
/// been handed out.
pub struct ScriptedChat {
    greeting: Mutex<Result<String, String>>,
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    fail_session_start: AtomicBool,
    pub sessions_started: AtomicUsize,
}

impl ScriptedChat {
    pub fn new(greeting: &str) -> Arc<Self> {
        Arc::new(Self {
            greeting: Mutex::new(Ok(greeting.to_string())),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            fail_session_start: AtomicBool::new(false),
            sessions_started: AtomicUsize::new(0),
        })
    }

    /// Queue the next reply (Ok) or failure (Err).
    pub fn push_reply(&self, reply: Result<&str, &str>) {
        self.replies
            .lock()
            .expect("replies lock")
            .push_back(reply.map(str::to_string).map_err(str::to_string));
    }

    /// Make the next `start_session` call fail once.
    pub fn fail_next_session_start(&self) {
        self.fail_session_start.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    async fn start_session(
        &self,
        _patient_data: &str,
        _persona: &str,
    ) -> Result<Box<dyn ChatSession>, ChatError> {
        if self.fail_session_start.swap(false, Ordering::SeqCst) {
            return Err(ChatError("session start refused".to_string()));
        }
        self.sessions_started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedChatSession {
            greeting: self.greeting.lock().expect("greeting lock").clone(),
            replies: Arc::clone(&self.replies),
        }))
    }
}

struct ScriptedChatSession {
    greeting: Result<String, String>,
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
}

#[async_trait]
impl ChatSession for ScriptedChatSession {
    async fn greeting(&mut self) -> Result<String, ChatError> {
        self.greeting.clone().map_err(ChatError)
    }

    async fn send(&mut self, _message: &str) -> Result<String, ChatError> {
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Ok("(no scripted reply)".to_string()))
            .map_err(ChatError)
    }
}
