//! Storage traits for job records and metrics.
//!
//! The storage layer is split into two focused traits:
//! - `JobStore`: Job Records keyed by signature
//! - `MetricsStore`: company daily metrics and daily aggregates
//! - `PipelineStore`: composite of both, what the pipeline is handed

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;

use crate::error::Result;
use crate::signature::JobSignature;
use crate::types::{
    CompanyDailyMetrics, CompanySummary, DailyAggregateMetrics, JobRecord, Stage, StageOutcome,
};

/// Result of an upsert keyed by signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A record with that signature already existed and was left untouched.
    Existing,
}

impl CreateOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created)
    }
}

/// Persistence for Job Records.
///
/// Implementations must keep signatures unique and must never clear a
/// stage completion flag on update.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a record unless its signature already exists.
    async fn create_job(&self, job: &JobRecord) -> Result<CreateOutcome>;

    /// Overwrite an existing record. Completion flags are merged, not replaced.
    async fn update_job(&self, job: &JobRecord) -> Result<()>;

    async fn find_by_signature(&self, signature: &JobSignature) -> Result<Option<JobRecord>>;

    /// Active jobs of a company waiting for `stage`: previous stage done,
    /// this stage not done.
    async fn find_by_company_and_stage(&self, company: &str, stage: Stage) -> Result<Vec<JobRecord>>;

    /// Every signature ever stored for a company, active or not.
    async fn signatures_for_company(&self, company: &str) -> Result<HashSet<JobSignature>>;

    async fn active_jobs_for_company(&self, company: &str) -> Result<Vec<JobRecord>>;

    async fn jobs_for_company(&self, company: &str) -> Result<Vec<JobRecord>>;

    /// Delete the company's active records that have not completed
    /// `through`. Returns how many were deleted. Inactive records are kept.
    async fn remove_incomplete_jobs(&self, company: &str, through: Stage) -> Result<u32>;
}

/// Persistence for metrics documents, keyed by (date, company) and date.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Set one stage's outcome on the company's document for `date`,
    /// creating the document if needed. Other stages are left intact.
    async fn upsert_stage_outcome(
        &self,
        date: NaiveDate,
        company: &str,
        stage: Stage,
        outcome: &StageOutcome,
    ) -> Result<()>;

    /// Set the company-level summary fields for `date`.
    async fn upsert_company_summary(
        &self,
        date: NaiveDate,
        company: &str,
        summary: &CompanySummary,
    ) -> Result<()>;

    async fn company_metrics(
        &self,
        date: NaiveDate,
        company: &str,
    ) -> Result<Option<CompanyDailyMetrics>>;

    /// Documents for a company between two dates, inclusive, oldest first.
    async fn company_metrics_range(
        &self,
        company: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompanyDailyMetrics>>;

    async fn metrics_for_date(&self, date: NaiveDate) -> Result<Vec<CompanyDailyMetrics>>;

    /// Replace the aggregate for its date.
    async fn upsert_daily_aggregate(&self, aggregate: &DailyAggregateMetrics) -> Result<()>;

    async fn daily_aggregate(&self, date: NaiveDate) -> Result<Option<DailyAggregateMetrics>>;
}

/// Composite storage trait combining jobs and metrics.
pub trait PipelineStore: JobStore + MetricsStore {}

// Blanket implementation: anything implementing both traits is a PipelineStore
impl<T: JobStore + MetricsStore> PipelineStore for T {}
