//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the pipeline
//! without making real network, LLM or database calls.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use crate::error::{PipelineError, Result};
use crate::signature::JobSignature;
use crate::traits::ai::{AiExtractor, AiRequest};
use crate::traits::store::{CreateOutcome, JobStore, MetricsStore};
use crate::traits::web::WebExtractor;
use crate::types::{
    CompanyDailyMetrics, CompanySummary, DailyAggregateMetrics, JobRecord, ParserStrategy, Stage,
    StageOutcome,
};

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Web
// ============================================================================

/// A mock web extractor serving fixed pages by URL.
///
/// Unknown URLs fail with a fetch error.
#[derive(Default)]
pub struct MockWebExtractor {
    pages: RwLock<HashMap<String, String>>,
    failures: RwLock<HashMap<String, String>>,
    calls: RwLock<Vec<String>>,
}

impl MockWebExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` for `url`.
    pub fn with_page(self, url: impl Into<String>, content: impl Into<String>) -> Self {
        self.set_page(url, content);
        self
    }

    /// Fail every fetch of `url`.
    pub fn with_failure(self, url: impl Into<String>, message: impl Into<String>) -> Self {
        self.set_failure(url, message);
        self
    }

    pub fn set_failure(&self, url: impl Into<String>, message: impl Into<String>) {
        write(&self.failures).insert(url.into(), message.into());
    }

    /// Replace a page between runs.
    pub fn set_page(&self, url: impl Into<String>, content: impl Into<String>) {
        write(&self.pages).insert(url.into(), content.into());
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        read(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        write(&self.calls).clear();
    }
}

#[async_trait]
impl WebExtractor for MockWebExtractor {
    async fn fetch_content(
        &self,
        url: &str,
        _selectors: &[String],
        _strategy: &ParserStrategy,
    ) -> Result<String> {
        write(&self.calls).push(url.to_string());

        if let Some(message) = read(&self.failures).get(url) {
            return Err(PipelineError::fetch(url, message.clone()));
        }
        read(&self.pages)
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::fetch(url, "page not found"))
    }
}

// ============================================================================
// AI
// ============================================================================

enum MockReply {
    Value(Value),
    Failure(String),
}

struct MockRule {
    template: String,
    needle: String,
    reply: MockReply,
}

/// A mock AI extractor.
///
/// Replies are matched on the request template plus a substring of any
/// template variable. The most recently added matching rule wins.
#[derive(Default)]
pub struct MockAiExtractor {
    rules: RwLock<Vec<MockRule>>,
    known_templates: RwLock<Option<HashSet<String>>>,
    calls: RwLock<Vec<AiRequest>>,
}

impl MockAiExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `response` when `template` is called with content containing `needle`.
    pub fn with_response(
        self,
        template: impl Into<String>,
        needle: impl Into<String>,
        response: Value,
    ) -> Self {
        self.set_response(template, needle, response);
        self
    }

    /// Fail with an AI error when `template` is called with content containing `needle`.
    pub fn with_failure(
        self,
        template: impl Into<String>,
        needle: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.set_failure(template, needle, message);
        self
    }

    /// Only these templates are known; others fail input validation.
    pub fn with_known_templates<I, S>(self, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_known_templates(templates);
        self
    }

    pub fn set_known_templates<I, S>(&self, templates: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *write(&self.known_templates) = Some(templates.into_iter().map(Into::into).collect());
    }

    pub fn set_response(&self, template: impl Into<String>, needle: impl Into<String>, response: Value) {
        write(&self.rules).push(MockRule {
            template: template.into(),
            needle: needle.into(),
            reply: MockReply::Value(response),
        });
    }

    pub fn set_failure(
        &self,
        template: impl Into<String>,
        needle: impl Into<String>,
        message: impl Into<String>,
    ) {
        write(&self.rules).push(MockRule {
            template: template.into(),
            needle: needle.into(),
            reply: MockReply::Failure(message.into()),
        });
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<AiRequest> {
        read(&self.calls).clone()
    }

    /// Calls made with a given template.
    pub fn calls_for(&self, template: &str) -> Vec<AiRequest> {
        read(&self.calls)
            .iter()
            .filter(|r| r.template == template)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        write(&self.calls).clear();
    }
}

#[async_trait]
impl AiExtractor for MockAiExtractor {
    async fn extract(&self, request: &AiRequest) -> Result<Value> {
        write(&self.calls).push(request.clone());

        let rules = read(&self.rules);
        let rule = rules.iter().rev().find(|rule| {
            rule.template == request.template
                && request.variables.values().any(|v| v.contains(&rule.needle))
        });

        match rule.map(|r| &r.reply) {
            Some(MockReply::Value(value)) => Ok(value.clone()),
            Some(MockReply::Failure(message)) => {
                Err(PipelineError::ai(request.context.clone(), message.clone()))
            }
            None => Err(PipelineError::ai(
                request.context.clone(),
                format!("no mock response for {}", request.template),
            )),
        }
    }

    fn knows_template(&self, template: &str) -> bool {
        read(&self.known_templates)
            .as_ref()
            .map(|known| known.contains(template))
            .unwrap_or(true)
    }
}

// ============================================================================
// Store
// ============================================================================

/// Store operations that [`FlakyStore`] can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateJob,
    UpdateJob,
    FindBySignature,
    FindByCompanyAndStage,
    SignaturesForCompany,
    ActiveJobsForCompany,
    JobsForCompany,
    RemoveIncompleteJobs,
    UpsertStageOutcome,
    UpsertCompanySummary,
    CompanyMetrics,
    CompanyMetricsRange,
    MetricsForDate,
    UpsertDailyAggregate,
    DailyAggregate,
}

/// Injected failures for one operation: let `pass` calls through, then
/// fail the next `fail` calls.
#[derive(Debug, Clone, Copy, Default)]
struct FailurePlan {
    pass: u32,
    fail: u32,
}

/// Wraps a store and fails chosen operations with retryable storage errors.
pub struct FlakyStore<S> {
    inner: S,
    plans: RwLock<HashMap<StoreOp, FailurePlan>>,
    calls: RwLock<HashMap<StoreOp, u32>>,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            plans: RwLock::new(HashMap::new()),
            calls: RwLock::new(HashMap::new()),
        }
    }

    /// Fail the next `times` calls of `op`.
    pub fn fail_times(self, op: StoreOp, times: u32) -> Self {
        self.set_failures(op, times);
        self
    }

    /// Fail every call of `op`.
    pub fn fail_always(self, op: StoreOp) -> Self {
        self.set_failures(op, u32::MAX);
        self
    }

    pub fn set_failures(&self, op: StoreOp, times: u32) {
        self.set_failures_after(op, 0, times);
    }

    /// Let the next `after` calls of `op` succeed, then fail `times` calls.
    pub fn set_failures_after(&self, op: StoreOp, after: u32, times: u32) {
        write(&self.plans).insert(
            op,
            FailurePlan {
                pass: after,
                fail: times,
            },
        );
    }

    /// Calls seen for `op`, failed ones included.
    pub fn calls(&self, op: StoreOp) -> u32 {
        read(&self.calls).get(&op).copied().unwrap_or(0)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, op: StoreOp) -> Result<()> {
        *write(&self.calls).entry(op).or_insert(0) += 1;

        let mut plans = write(&self.plans);
        let Some(plan) = plans.get_mut(&op) else {
            return Ok(());
        };
        if plan.pass > 0 {
            plan.pass -= 1;
            return Ok(());
        }
        match plan.fail {
            0 => Ok(()),
            u32::MAX => Err(PipelineError::storage(format!("injected failure: {:?}", op))),
            _ => {
                plan.fail -= 1;
                Err(PipelineError::storage(format!("injected failure: {:?}", op)))
            }
        }
    }
}

#[async_trait]
impl<S: JobStore> JobStore for FlakyStore<S> {
    async fn create_job(&self, job: &JobRecord) -> Result<CreateOutcome> {
        self.check(StoreOp::CreateJob)?;
        self.inner.create_job(job).await
    }

    async fn update_job(&self, job: &JobRecord) -> Result<()> {
        self.check(StoreOp::UpdateJob)?;
        self.inner.update_job(job).await
    }

    async fn find_by_signature(&self, signature: &JobSignature) -> Result<Option<JobRecord>> {
        self.check(StoreOp::FindBySignature)?;
        self.inner.find_by_signature(signature).await
    }

    async fn find_by_company_and_stage(&self, company: &str, stage: Stage) -> Result<Vec<JobRecord>> {
        self.check(StoreOp::FindByCompanyAndStage)?;
        self.inner.find_by_company_and_stage(company, stage).await
    }

    async fn signatures_for_company(&self, company: &str) -> Result<HashSet<JobSignature>> {
        self.check(StoreOp::SignaturesForCompany)?;
        self.inner.signatures_for_company(company).await
    }

    async fn active_jobs_for_company(&self, company: &str) -> Result<Vec<JobRecord>> {
        self.check(StoreOp::ActiveJobsForCompany)?;
        self.inner.active_jobs_for_company(company).await
    }

    async fn jobs_for_company(&self, company: &str) -> Result<Vec<JobRecord>> {
        self.check(StoreOp::JobsForCompany)?;
        self.inner.jobs_for_company(company).await
    }

    async fn remove_incomplete_jobs(&self, company: &str, through: Stage) -> Result<u32> {
        self.check(StoreOp::RemoveIncompleteJobs)?;
        self.inner.remove_incomplete_jobs(company, through).await
    }
}

#[async_trait]
impl<S: MetricsStore> MetricsStore for FlakyStore<S> {
    async fn upsert_stage_outcome(
        &self,
        date: NaiveDate,
        company: &str,
        stage: Stage,
        outcome: &StageOutcome,
    ) -> Result<()> {
        self.check(StoreOp::UpsertStageOutcome)?;
        self.inner.upsert_stage_outcome(date, company, stage, outcome).await
    }

    async fn upsert_company_summary(
        &self,
        date: NaiveDate,
        company: &str,
        summary: &CompanySummary,
    ) -> Result<()> {
        self.check(StoreOp::UpsertCompanySummary)?;
        self.inner.upsert_company_summary(date, company, summary).await
    }

    async fn company_metrics(
        &self,
        date: NaiveDate,
        company: &str,
    ) -> Result<Option<CompanyDailyMetrics>> {
        self.check(StoreOp::CompanyMetrics)?;
        self.inner.company_metrics(date, company).await
    }

    async fn company_metrics_range(
        &self,
        company: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompanyDailyMetrics>> {
        self.check(StoreOp::CompanyMetricsRange)?;
        self.inner.company_metrics_range(company, start, end).await
    }

    async fn metrics_for_date(&self, date: NaiveDate) -> Result<Vec<CompanyDailyMetrics>> {
        self.check(StoreOp::MetricsForDate)?;
        self.inner.metrics_for_date(date).await
    }

    async fn upsert_daily_aggregate(&self, aggregate: &DailyAggregateMetrics) -> Result<()> {
        self.check(StoreOp::UpsertDailyAggregate)?;
        self.inner.upsert_daily_aggregate(aggregate).await
    }

    async fn daily_aggregate(&self, date: NaiveDate) -> Result<Option<DailyAggregateMetrics>> {
        self.check(StoreOp::DailyAggregate)?;
        self.inner.daily_aggregate(date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_ai_matches_template_and_needle() {
        let ai = MockAiExtractor::new()
            .with_response("job_details", "job-1", json!({"n": 1}))
            .with_response("job_requirements", "job-1", json!({"n": 2}))
            .with_failure("job_details", "job-2", "rate limited");

        let req = AiRequest::new("job_details", "Engineer").with_variable("html_content", "<p>job-1</p>");
        assert_eq!(ai.extract(&req).await.unwrap()["n"], 1);

        let req = AiRequest::new("job_details", "Engineer").with_variable("html_content", "job-2");
        assert!(ai.extract(&req).await.unwrap_err().is_retryable());

        assert_eq!(ai.calls_for("job_details").len(), 2);
    }

    #[tokio::test]
    async fn test_mock_web_serves_and_fails() {
        let web = MockWebExtractor::new()
            .with_page("https://acme.test/careers", "listing")
            .with_failure("https://down.test", "timeout");

        let strategy = ParserStrategy::Default;
        assert_eq!(
            web.fetch_content("https://acme.test/careers", &[], &strategy).await.unwrap(),
            "listing"
        );
        assert!(web.fetch_content("https://down.test", &[], &strategy).await.is_err());
        assert!(web.fetch_content("https://unknown.test", &[], &strategy).await.is_err());
        assert_eq!(web.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_flaky_store_fails_then_recovers() {
        let store = FlakyStore::new(MemoryStore::new()).fail_times(StoreOp::SignaturesForCompany, 1);

        assert!(store.signatures_for_company("Acme").await.is_err());
        assert!(store.signatures_for_company("Acme").await.is_ok());
        assert_eq!(store.calls(StoreOp::SignaturesForCompany), 2);
    }

    #[tokio::test]
    async fn test_flaky_store_passes_then_fails() {
        let store = FlakyStore::new(MemoryStore::new());
        store.set_failures_after(StoreOp::JobsForCompany, 2, 1);

        assert!(store.jobs_for_company("Acme").await.is_ok());
        assert!(store.jobs_for_company("Acme").await.is_ok());
        assert!(store.jobs_for_company("Acme").await.is_err());
        assert!(store.jobs_for_company("Acme").await.is_ok());
    }
}
