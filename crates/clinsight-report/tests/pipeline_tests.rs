//! End-to-end pipeline tests over scripted providers and a real temp-dir
//! cache.

use clinsight_cache::CacheKey;
use clinsight_core::{AnalysisLens, CachedValue, ClinicalMetrics};
use clinsight_report::{LensState, ReportOrchestrator, FAILED_SECTION_PLACEHOLDER};
use clinsight_test_utils::{
    init_test_logging, temp_cache, FailingVerifier, ScriptedChat, ScriptedGenerator,
    SectionScript, StaticVerifier,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

const PATIENT_A: &str = "Patient A: hypertension, BP 142/90, on lisinopril 10mg.";

fn setup(generator: Arc<ScriptedGenerator>) -> (TempDir, ReportOrchestrator) {
    init_test_logging();
    let (dir, cache) = temp_cache();
    let orchestrator = ReportOrchestrator::new(
        generator,
        Arc::new(StaticVerifier::verified()),
        ScriptedChat::new("Hello, how can I help with this report?"),
        cache,
    );
    (dir, orchestrator)
}

fn lens_key(patient_data: &str, lens: AnalysisLens) -> CacheKey {
    CacheKey::derive(&[
        json!(patient_data),
        json!(lens.system_instruction()),
        json!(lens.title()),
    ])
    .unwrap()
}

#[tokio::test]
async fn full_run_generates_every_lens() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (_dir, orchestrator) = setup(Arc::clone(&generator));

    let results = orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    for lens in AnalysisLens::ALL {
        assert_eq!(results[&lens], format!("{} section", lens.title()));
    }
    assert_eq!(generator.stream_calls.load(Ordering::SeqCst), 4);

    let progress = orchestrator.subscribe().borrow().clone();
    assert!(!progress.loading);
    assert!(progress.error.is_none());
    assert_eq!(progress.metrics, Some(ClinicalMetrics::new(4.0, 6.0, 7.0)));
    assert!(progress
        .lenses
        .values()
        .all(|lp| lp.state == LensState::Verified));
}

#[tokio::test]
async fn generated_sections_are_persisted_under_their_keys() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (_dir, orchestrator) = setup(Arc::clone(&generator));

    let results = orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    for lens in AnalysisLens::ALL {
        let cached = orchestrator.cache().get(&lens_key(PATIENT_A, lens)).await;
        assert_eq!(cached, Some(CachedValue::Text(results[&lens].clone())));
    }
}

#[tokio::test]
async fn second_run_resolves_from_cache_without_generation() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (_dir, orchestrator) = setup(Arc::clone(&generator));
    let first = orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    // Fresh orchestrator (no retained session state) over the same cache:
    // every lens must be a cache hit.
    let second_generator = Arc::new(ScriptedGenerator::new());
    let second = ReportOrchestrator::new(
        Arc::clone(&second_generator) as Arc<dyn clinsight_llm::LensGenerator>,
        Arc::new(StaticVerifier::verified()),
        ScriptedChat::new("hi"),
        orchestrator.cache().clone(),
    );

    let results = second
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    assert_eq!(results, first);
    assert_eq!(second_generator.stream_calls.load(Ordering::SeqCst), 0);

    let progress = second.subscribe().borrow().clone();
    assert!(progress
        .lenses
        .values()
        .all(|lp| lp.state == LensState::Verified));
}

#[tokio::test]
async fn failed_lens_gets_placeholder_and_others_survive() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.script(
        AnalysisLens::CarePlanOverview,
        SectionScript::FailOpen("model overloaded".to_string()),
    );
    let (_dir, orchestrator) = setup(Arc::clone(&generator));

    let results = orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    assert_eq!(
        results[&AnalysisLens::CarePlanOverview],
        FAILED_SECTION_PLACEHOLDER
    );
    for lens in &AnalysisLens::ALL[1..] {
        assert_eq!(results[lens], format!("{} section", lens.title()));
    }
    assert_eq!(generator.stream_calls.load(Ordering::SeqCst), 4);

    let progress = orchestrator.subscribe().borrow().clone();
    assert_eq!(
        progress.lenses[&AnalysisLens::CarePlanOverview].state,
        LensState::Failed
    );
    assert_eq!(
        progress.lenses[&AnalysisLens::PatientEducation].state,
        LensState::Verified
    );
}

#[tokio::test]
async fn mid_stream_failure_is_isolated_too() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.script(
        AnalysisLens::MonitoringFollowUp,
        SectionScript::FailMidStream(
            vec!["Monitor blood ".to_string()],
            "connection reset".to_string(),
        ),
    );
    let (_dir, orchestrator) = setup(Arc::clone(&generator));

    let results = orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    assert_eq!(
        results[&AnalysisLens::MonitoringFollowUp],
        FAILED_SECTION_PLACEHOLDER
    );
    // The interrupted section must not be persisted.
    let cached = orchestrator
        .cache()
        .get(&lens_key(PATIENT_A, AnalysisLens::MonitoringFollowUp))
        .await;
    assert_eq!(cached, None);
}

#[tokio::test]
async fn insignificant_change_reuses_results_and_backfills_cache() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (_dir, orchestrator) = setup(Arc::clone(&generator));
    let first = orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();
    assert_eq!(generator.stream_calls.load(Ordering::SeqCst), 4);
    assert_eq!(generator.metrics_calls.load(Ordering::SeqCst), 1);

    // Cosmetic edit; the detector judges it insignificant.
    let patient_a_reworded = "Patient A: hypertension, BP 142/90, taking lisinopril 10mg.";
    generator.set_significant(false);

    let second = orchestrator
        .generate_comprehensive_report(patient_a_reworded)
        .await
        .unwrap();

    assert_eq!(second, first);
    assert_eq!(generator.change_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        generator.stream_calls.load(Ordering::SeqCst),
        4,
        "no lens regeneration on an insignificant delta"
    );
    // Full text is unchanged, so metrics resolve from cache.
    assert_eq!(generator.metrics_calls.load(Ordering::SeqCst), 1);

    // The retained text is now cached under the NEW input's keys.
    for lens in AnalysisLens::ALL {
        let cached = orchestrator
            .cache()
            .get(&lens_key(patient_a_reworded, lens))
            .await;
        assert_eq!(cached, Some(CachedValue::Text(first[&lens].clone())));
    }
}

#[tokio::test]
async fn end_to_end_example_scenario() {
    // spec example: all-miss run returns the generated text, and a
    // subsequent insignificant-delta call returns the identical mapping
    // without touching the generator again.
    let generator = Arc::new(ScriptedGenerator::new());
    generator.script(
        AnalysisLens::CarePlanOverview,
        SectionScript::Chunks(vec!["X".to_string()]),
    );
    let (_dir, orchestrator) = setup(Arc::clone(&generator));

    let first = orchestrator.generate_comprehensive_report("A").await.unwrap();
    assert_eq!(first[&AnalysisLens::CarePlanOverview], "X");

    generator.set_significant(false);
    let second = orchestrator.generate_comprehensive_report("A").await.unwrap();
    assert_eq!(second, first);
    assert_eq!(generator.stream_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn change_detector_failure_fails_open_to_full_generation() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (_dir, orchestrator) = setup(Arc::clone(&generator));
    orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    generator.fail_change_detection();
    let different = "Patient A: new onset chest pain, BP 165/100.";
    let results = orchestrator
        .generate_comprehensive_report(different)
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    // New input, detector unavailable: all four lenses regenerate.
    assert_eq!(generator.stream_calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn verifier_failure_leaves_results_intact_and_verification_unset() {
    init_test_logging();
    let generator = Arc::new(ScriptedGenerator::new());
    let verifier = Arc::new(FailingVerifier::default());
    let (_dir, cache) = temp_cache();
    let orchestrator = ReportOrchestrator::new(
        Arc::clone(&generator) as Arc<dyn clinsight_llm::LensGenerator>,
        Arc::clone(&verifier) as Arc<dyn clinsight_llm::Verifier>,
        ScriptedChat::new("hi"),
        cache,
    );

    let results = orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(verifier.calls.load(Ordering::SeqCst), 4);

    let progress = orchestrator.subscribe().borrow().clone();
    for lp in progress.lenses.values() {
        assert!(lp.verification.is_none());
        assert_eq!(lp.state, LensState::Persisted);
    }
}

#[tokio::test]
async fn metrics_provider_failure_falls_back_to_neutral() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.set_metrics(Err("metrics endpoint down"));
    let (_dir, orchestrator) = setup(Arc::clone(&generator));

    orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    let progress = orchestrator.subscribe().borrow().clone();
    assert_eq!(progress.metrics, Some(ClinicalMetrics::neutral()));
}

#[tokio::test]
async fn out_of_range_metrics_fall_back_to_neutral() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.set_metrics(Ok(ClinicalMetrics::new(42.0, 5.0, 5.0)));
    let (_dir, orchestrator) = setup(Arc::clone(&generator));

    orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    let progress = orchestrator.subscribe().borrow().clone();
    assert_eq!(progress.metrics, Some(ClinicalMetrics::neutral()));
    assert_eq!(generator.metrics_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn master_snapshot_is_persisted_and_retrievable() {
    let generator = Arc::new(ScriptedGenerator::new());
    let (_dir, orchestrator) = setup(Arc::clone(&generator));

    let results = orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    let full_text = ReportOrchestrator::full_report_text(&results);
    let snapshot = orchestrator
        .cached_snapshot(&full_text)
        .await
        .expect("snapshot persisted");

    assert_eq!(snapshot.sections, results);
    assert_eq!(snapshot.metrics, ClinicalMetrics::new(4.0, 6.0, 7.0));
}

#[tokio::test]
async fn placeholder_sections_participate_in_snapshot_and_metrics() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.script(
        AnalysisLens::PatientEducation,
        SectionScript::FailOpen("overloaded".to_string()),
    );
    let (_dir, orchestrator) = setup(Arc::clone(&generator));

    let results = orchestrator
        .generate_comprehensive_report(PATIENT_A)
        .await
        .unwrap();

    // Partial report still produces a snapshot: partial beats nothing.
    let full_text = ReportOrchestrator::full_report_text(&results);
    assert!(full_text.contains(FAILED_SECTION_PLACEHOLDER));
    assert!(orchestrator.cached_snapshot(&full_text).await.is_some());
}
