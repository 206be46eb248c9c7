//! End-to-end runs of the pipeline over mock collaborators.

mod common;

use common::*;
use job_pipeline::testing::StoreOp;
use job_pipeline::{
    Company, CompanyStatus, MetricsStore, PipelineError, Stage, StageStatus,
};
use serde_json::json;
use test_context::test_context;

// =============================================================================
// Acme: discovery, rerun, removal
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_acme_end_to_end(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a", "b"]);

    // First run: both postings discovered and fully enriched
    let report = ctx.run().await;

    let listing = report.stage(Stage::Listing).unwrap().outcome("Acme").unwrap();
    assert_eq!(listing.status, StageStatus::Success);
    assert_eq!((listing.processed, listing.completed), (2, 2));

    for stage in [Stage::Details, Stage::Requirements, Stage::Technologies] {
        let outcome = report.stage(stage).unwrap().outcome("Acme").unwrap();
        assert_eq!(outcome.status, StageStatus::Success, "{stage}");
        assert_eq!(outcome.completed, 2, "{stage}");
    }

    let a = ctx.job("Acme", "a");
    assert!(a.active);
    assert!(a.is_completed(Stage::Technologies));
    assert_eq!(a.details.as_ref().unwrap().city, "Escazú");
    assert_eq!(a.technologies.as_ref().unwrap().main_technologies, vec!["Rust", "PostgreSQL"]);

    let summary = report.summary("Acme").unwrap();
    assert_eq!(summary.new_jobs, 2);
    assert_eq!(summary.active_jobs, 2);
    assert_eq!(summary.overall_status, CompanyStatus::Success);

    // Second run over the same page: nothing new, nothing pending
    ctx.ai.clear_calls();
    let report = ctx.run().await;

    let listing = report.stage(Stage::Listing).unwrap().outcome("Acme").unwrap();
    assert_eq!(listing.completed, 0);
    assert_eq!(listing.status, StageStatus::Success);
    assert_eq!(
        report.stage(Stage::Details).unwrap().outcome("Acme").unwrap().status,
        StageStatus::Skipped
    );
    assert!(ctx.ai.calls_for("job_details").is_empty());
    assert_eq!(ctx.memory().job_count(), 2);
    assert_eq!(report.summary("Acme").unwrap().overall_status, CompanyStatus::Success);

    // Third run: B is gone from the page
    ctx.set_listing("Acme", &["a"]);
    let report = ctx.run().await;

    assert_eq!(report.sweeps["Acme"].deactivated, 1);
    let b = ctx.job("Acme", "b");
    assert!(!b.active);
    assert!(b.deactivated_at.is_some());
    assert!(ctx.job("Acme", "a").active);

    let summary = report.summary("Acme").unwrap();
    assert_eq!(summary.active_jobs, 1);
    assert_eq!(summary.inactive_jobs, 1);
    assert_eq!(summary.jobs_deactivated, 1);
    assert_eq!(report.aggregate.as_ref().unwrap().total_jobs_deactivated, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_reappearing_posting_stays_inactive_by_default(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a", "b"]);
    ctx.run().await;

    ctx.set_listing("Acme", &["a"]);
    ctx.run().await;

    ctx.set_listing("Acme", &["a", "b"]);
    let report = ctx.run().await;

    let listing = report.stage(Stage::Listing).unwrap().outcome("Acme").unwrap();
    assert_eq!(listing.completed, 0);
    assert_eq!(ctx.memory().job_count(), 2);
    assert!(!ctx.job("Acme", "b").active);
    assert_eq!(report.sweeps["Acme"].reactivated, 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_reappearing_posting_reactivated_when_enabled(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a", "b"]);
    ctx.run().await;

    ctx.set_listing("Acme", &["a"]);
    ctx.run().await;

    ctx.set_listing("Acme", &["a", "b"]);
    let config = TestHarness::config().with_reactivate_reappeared(true);
    let report = ctx.pipeline_with(config).run().await.unwrap();

    assert_eq!(report.sweeps["Acme"].reactivated, 1);
    assert_eq!(report.sweeps["Acme"].deactivated, 0);
    let b = ctx.job("Acme", "b");
    assert!(b.active);
    assert!(b.deactivated_at.is_none());
    assert_eq!(ctx.memory().job_count(), 2);
}

// =============================================================================
// Ingestion
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_ingestion_is_idempotent(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a"]);
    // Same posting three ways on one page
    ctx.ai.set_response(
        "job_listing",
        career_needle("Acme"),
        json!({"jobs": [
            {"title": "a Engineer", "url": "https://acme.test/jobs/a"},
            {"title": "a Engineer", "url": "https://acme.test/jobs/a/"},
            {"title": "a Engineer", "url": "https://ACME.test/jobs/a#apply"}
        ]}),
    );

    let first = ctx.run().await;
    assert_eq!(first.stage(Stage::Listing).unwrap().outcome("Acme").unwrap().completed, 1);
    assert_eq!(ctx.memory().job_count(), 1);

    let second = ctx.run().await;
    assert_eq!(second.stage(Stage::Listing).unwrap().outcome("Acme").unwrap().completed, 0);
    assert_eq!(ctx.memory().job_count(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_invalid_company_fails_listing_without_retry(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a"]);
    ctx.add_company_config(Company::new("Broken", "ftp://broken.test/careers"), &[]);

    let report = ctx.run().await;

    let broken = report.stage(Stage::Listing).unwrap().outcome("Broken").unwrap();
    assert_eq!(broken.status, StageStatus::Failed);
    assert!(!broken.retryable);
    assert_eq!(report.summary("Broken").unwrap().overall_status, CompanyStatus::Failed);
    assert_eq!(report.summary("Acme").unwrap().overall_status, CompanyStatus::Success);
    assert!(!report.sweeps.contains_key("Broken"));
}

// =============================================================================
// Failure isolation
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_partial_failure_isolation(ctx: &TestHarness) {
    let names = ["Alpha", "Bravo", "Charlie", "Delta", "Echo"];
    for name in names {
        ctx.add_company(name, &["1"]);
    }
    ctx.ai.set_failure(
        "job_details",
        job_needle(&job_url("Delta", "1")),
        "rate limited (429)",
    );

    let report = ctx.run().await;

    for name in names.iter().filter(|n| **n != "Delta") {
        let job = ctx.job(name, "1");
        assert!(job.is_completed(Stage::Technologies), "{name}");
        assert_eq!(report.summary(name).unwrap().overall_status, CompanyStatus::Success);
    }

    let delta = ctx.job("Delta", "1");
    assert!(delta.details.is_none());
    assert!(!delta.is_completed(Stage::Details));

    let doc = ctx.store.company_metrics(report.date, "Delta").await.unwrap().unwrap();
    let details = doc.stage(Stage::Details).unwrap();
    assert_eq!(details.status, StageStatus::Failed);
    assert!(details.retryable);
    assert!(details.error.as_deref().unwrap().contains("rate limited"));
    assert_eq!(doc.stage(Stage::Requirements).unwrap().status, StageStatus::Skipped);
    assert_eq!(doc.overall_status, CompanyStatus::Partial);

    assert!(report.halted_stages.is_empty());
    let aggregate = report.aggregate.unwrap();
    assert_eq!(aggregate.total_companies, 5);
    assert_eq!(aggregate.companies_successful, 4);
    assert_eq!(aggregate.companies_partial, 1);
    assert_eq!(aggregate.overall_success_rate, 80.0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_retryable_failure_is_picked_up_next_run(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a"]);
    let needle = job_needle(&job_url("Acme", "a"));
    ctx.ai.set_failure("job_details", needle.clone(), "timeout");

    ctx.run().await;
    assert!(!ctx.job("Acme", "a").is_completed(Stage::Details));

    ctx.ai.set_response("job_details", needle, details_response());
    let report = ctx.run().await;

    assert!(ctx.job("Acme", "a").is_completed(Stage::Technologies));
    assert_eq!(report.summary("Acme").unwrap().overall_status, CompanyStatus::Success);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_validation_failures_are_counted_not_fatal(ctx: &TestHarness) {
    ctx.add_company("Acme", &["good", "bad"]);
    ctx.add_company("Zeta", &["bad"]);
    for company in ["Acme", "Zeta"] {
        ctx.ai.set_response(
            "job_details",
            job_needle(&job_url(company, "bad")),
            invalid_details_response(),
        );
    }

    let report = ctx.run().await;
    let details = report.stage(Stage::Details).unwrap();

    let acme = details.outcome("Acme").unwrap();
    assert_eq!(acme.status, StageStatus::Success);
    assert_eq!((acme.processed, acme.completed, acme.failed), (2, 1, 1));
    assert!(ctx.job("Acme", "good").is_completed(Stage::Details));
    assert!(!ctx.job("Acme", "bad").is_completed(Stage::Details));

    let zeta = details.outcome("Zeta").unwrap();
    assert_eq!(zeta.status, StageStatus::Failed);
    assert!(!zeta.retryable);
    assert!(zeta.error.as_deref().unwrap().contains("no jobs successfully processed"));

    // Zeta's later stages have nothing to do
    assert_eq!(
        report.stage(Stage::Requirements).unwrap().outcome("Zeta").unwrap().status,
        StageStatus::Skipped
    );
    assert_eq!(report.summary("Zeta").unwrap().overall_status, CompanyStatus::Partial);
}

// =============================================================================
// Storage failures during a stage
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_failed_details_write_leaves_flag_unset(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a", "b"]);
    ctx.store.set_failures(StoreOp::UpdateJob, 1);

    let report = ctx.run().await;

    let details = report.stage(Stage::Details).unwrap().outcome("Acme").unwrap();
    assert_eq!(details.status, StageStatus::Failed);
    assert!(details.retryable);
    assert_eq!((details.processed, details.completed), (2, 0));
    assert!(details.error.as_deref().unwrap().contains("UpdateJob"));
    for slug in ["a", "b"] {
        let job = ctx.job("Acme", slug);
        assert!(!job.is_completed(Stage::Details), "{slug}");
        assert!(job.details.is_none(), "{slug}");
    }
    assert_eq!(report.halted_stages, vec![Stage::Requirements, Stage::Technologies]);
    assert_eq!(report.summary("Acme").unwrap().overall_status, CompanyStatus::Partial);

    // Next run picks both jobs up again
    let report = ctx.run().await;
    let details = report.stage(Stage::Details).unwrap().outcome("Acme").unwrap();
    assert_eq!(details.completed, 2);
    for slug in ["a", "b"] {
        assert!(ctx.job("Acme", slug).is_completed(Stage::Technologies), "{slug}");
    }
    assert_eq!(report.summary("Acme").unwrap().overall_status, CompanyStatus::Success);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_failed_insert_keeps_earlier_inserts(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a", "b", "c"]);
    // First insert goes through, the second fails and stops the unit
    ctx.store.set_failures_after(StoreOp::CreateJob, 1, 1);

    let report = ctx.run().await;

    let listing = report.stage(Stage::Listing).unwrap().outcome("Acme").unwrap();
    assert_eq!(listing.status, StageStatus::Failed);
    assert!(listing.retryable);
    assert_eq!(listing.completed, 1);
    assert_eq!(ctx.memory().job_count(), 1);
    assert!(ctx.job("Acme", "a").active);
    assert!(!report.sweeps.contains_key("Acme"));

    let report = ctx.run().await;

    let listing = report.stage(Stage::Listing).unwrap().outcome("Acme").unwrap();
    assert_eq!(listing.status, StageStatus::Success);
    assert_eq!(listing.completed, 2);
    assert_eq!(ctx.memory().job_count(), 3);
    // Two attempts per run; the stored job is filtered out before insert
    assert_eq!(ctx.store.calls(StoreOp::CreateJob), 4);
    for slug in ["a", "b", "c"] {
        assert!(ctx.job("Acme", slug).is_completed(Stage::Technologies), "{slug}");
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_failed_pending_query_fails_only_that_company(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a"]);
    ctx.add_company("Beta", &["a"]);
    ctx.store.set_failures(StoreOp::FindByCompanyAndStage, 1);

    let report = ctx.run().await;

    let details = report.stage(Stage::Details).unwrap();
    let failed: Vec<String> = details.failed_companies().into_iter().map(String::from).collect();
    assert_eq!(failed.len(), 1);
    let broken = failed[0].as_str();
    let healthy = if broken == "Acme" { "Beta" } else { "Acme" };

    let outcome = details.outcome(broken).unwrap();
    assert!(outcome.retryable);
    assert_eq!(outcome.processed, 0);
    assert!(!ctx.job(broken, "a").is_completed(Stage::Details));
    assert_eq!(
        report.stage(Stage::Requirements).unwrap().outcome(broken).unwrap().status,
        StageStatus::Skipped
    );
    assert_eq!(report.summary(broken).unwrap().overall_status, CompanyStatus::Partial);

    assert_eq!(details.outcome(healthy).unwrap().status, StageStatus::Success);
    assert!(ctx.job(healthy, "a").is_completed(Stage::Technologies));
    assert_eq!(report.summary(healthy).unwrap().overall_status, CompanyStatus::Success);
    assert!(report.halted_stages.is_empty());
}

// =============================================================================
// Cleanup of incomplete jobs
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_incomplete_jobs_are_rediscovered_when_cleanup_enabled(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a", "b"]);
    let needle = job_needle(&job_url("Acme", "b"));
    ctx.ai.set_failure("job_details", needle.clone(), "timeout");

    let keep_going = TestHarness::config().with_halt_on_total_stage_failure(false);
    let report = ctx.pipeline_with(keep_going).run().await.unwrap();
    assert!(report.removed_incomplete.is_empty());
    assert!(ctx.job("Acme", "a").is_completed(Stage::Technologies));
    assert!(!ctx.job("Acme", "b").is_completed(Stage::Details));

    ctx.ai.set_response("job_details", needle, details_response());
    let config = TestHarness::config().with_remove_incomplete_jobs(true);
    let report = ctx.pipeline_with(config).run().await.unwrap();

    assert_eq!(report.removed_incomplete["Acme"], 1);
    let listing = report.stage(Stage::Listing).unwrap().outcome("Acme").unwrap();
    assert_eq!(listing.completed, 1);
    assert_eq!(ctx.memory().job_count(), 2);
    assert!(ctx.job("Acme", "b").is_completed(Stage::Technologies));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_cleanup_failure_does_not_fail_the_run(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a"]);
    ctx.store.set_failures(StoreOp::RemoveIncompleteJobs, 1);

    let config = TestHarness::config().with_remove_incomplete_jobs(true);
    let report = ctx.pipeline_with(config).run().await.unwrap();

    assert!(report.removed_incomplete.is_empty());
    assert!(ctx.job("Acme", "a").is_completed(Stage::Technologies));
}

// =============================================================================
// Run date
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_run_files_everything_under_its_start_day(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a"]);

    let config = TestHarness::config().with_utc_offset_hours(14);
    let pipeline = ctx.pipeline_with(config);
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.date, pipeline.config().local_date(report.started_at));
    let doc = ctx.store.company_metrics(report.date, "Acme").await.unwrap().unwrap();
    assert_eq!(doc.stage_outcomes.len(), 4);
    assert_eq!(doc.overall_status, CompanyStatus::Success);
    assert_eq!(report.aggregate.unwrap().date, report.date);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_halts_after_total_stage_failure(ctx: &TestHarness) {
    for name in ["Alpha", "Bravo"] {
        ctx.add_company(name, &["1"]);
        ctx.web.set_failure(career_url(name), "connection reset");
    }

    let report = ctx.run().await;

    assert_eq!(report.stages.len(), 1);
    assert!(report.stage(Stage::Listing).unwrap().all_failed());
    assert_eq!(
        report.halted_stages,
        vec![Stage::Details, Stage::Requirements, Stage::Technologies]
    );
    assert!(report.sweeps.is_empty());

    let alpha = report.stage(Stage::Listing).unwrap().outcome("Alpha").unwrap();
    assert!(alpha.retryable);

    // Settlement still runs
    assert_eq!(report.summary("Alpha").unwrap().overall_status, CompanyStatus::Failed);
    let aggregate = report.aggregate.unwrap();
    assert_eq!(aggregate.companies_failed, 2);
    assert_eq!(aggregate.overall_success_rate, 0.0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_total_failure_without_halting(ctx: &TestHarness) {
    ctx.add_company("Alpha", &["1"]);
    ctx.web.set_failure(career_url("Alpha"), "connection reset");

    let config = TestHarness::config().with_halt_on_total_stage_failure(false);
    let report = ctx.pipeline_with(config).run().await.unwrap();

    assert_eq!(report.stages.len(), 4);
    assert!(report.halted_stages.is_empty());
    assert_eq!(
        report.stage(Stage::Details).unwrap().outcome("Alpha").unwrap().status,
        StageStatus::Skipped
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_metrics_write_failures_do_not_fail_the_run(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a", "b"]);
    ctx.store.set_failures(StoreOp::UpsertStageOutcome, u32::MAX);

    let report = ctx.run().await;

    let listing = report.stage(Stage::Listing).unwrap();
    assert!(!listing.companies["Acme"].metrics_recorded);
    assert_eq!(ctx.memory().job_count(), 2);
    assert!(ctx.job("Acme", "b").is_completed(Stage::Technologies));
    // one attempt per unit with retries disabled
    assert_eq!(ctx.store.calls(StoreOp::UpsertStageOutcome), 4);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_single_stage_run(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a"]);

    let config = TestHarness::config().with_only_stages(&[Stage::Listing]);
    let report = ctx.pipeline_with(config).run().await.unwrap();

    assert_eq!(report.stages.len(), 1);
    let job = ctx.job("Acme", "a");
    assert!(job.is_completed(Stage::Listing));
    assert!(!job.is_completed(Stage::Details));
    assert!(ctx.ai.calls_for("job_details").is_empty());
}

// =============================================================================
// Input validation
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn test_empty_registry_is_rejected(ctx: &TestHarness) {
    let err = ctx.pipeline().run().await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_no_enabled_company_is_rejected(ctx: &TestHarness) {
    ctx.add_company_config(Company::new("Acme", career_url("Acme")).disabled(), &["a"]);

    let err = ctx.pipeline().run().await.unwrap_err();
    assert!(err.to_string().contains("no enabled companies"));
    assert!(ctx.web.calls().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_unknown_prompt_template_is_rejected(ctx: &TestHarness) {
    ctx.add_company("Acme", &["a"]);
    ctx.ai
        .set_known_templates(["job_listing", "job_details", "job_requirements"]);

    let err = ctx.pipeline().run().await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert!(err.to_string().contains("job_technologies"));
    assert!(ctx.web.calls().is_empty());

    // Disabling the stage makes the run valid
    let config = TestHarness::config().with_only_stages(&[
        Stage::Listing,
        Stage::Details,
        Stage::Requirements,
    ]);
    assert!(ctx.pipeline_with(config).run().await.is_ok());
}

struct OfflineRegistry;

#[async_trait::async_trait]
impl job_pipeline::CompanyRegistry for OfflineRegistry {
    async fn list_companies(&self) -> job_pipeline::Result<Vec<Company>> {
        Err(PipelineError::storage("registry offline"))
    }
}

#[tokio::test]
async fn test_registry_failure_fails_the_run() {
    let harness = TestHarness::new();
    let deps = job_pipeline::PipelineDeps::builder()
        .registry(std::sync::Arc::new(OfflineRegistry))
        .web(harness.web.clone())
        .ai(harness.ai.clone())
        .store(harness.store.clone())
        .build();

    let pipeline = job_pipeline::Pipeline::new(TestHarness::config(), deps).unwrap();
    let err = pipeline.run().await.unwrap_err();
    assert!(err.to_string().contains("registry offline"));
    assert!(harness.web.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_rejected_up_front() {
    let harness = TestHarness::new();
    let deps = job_pipeline::PipelineDeps::builder()
        .registry(std::sync::Arc::new(job_pipeline::StaticRegistry::new(vec![])))
        .web(harness.web.clone())
        .ai(harness.ai.clone())
        .store(harness.store.clone())
        .build();

    let config = TestHarness::config().with_concurrency(0);
    let err = job_pipeline::Pipeline::new(config, deps).err().unwrap();
    assert!(matches!(err, PipelineError::Config(_)));
}
