//! Metrics documents: per-stage outcomes, per-company daily metrics and the
//! pipeline-wide daily aggregate.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::stage::Stage;
use crate::error::PipelineError;

// ============================================================================
// Stage Outcome
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one company unit for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub status: StageStatus,
    pub processed: u32,
    pub completed: u32,
    pub failed: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    #[serde(default)]
    pub error: Option<String>,
    /// Set when the failure is expected to clear on a later run.
    #[serde(default)]
    pub retryable: bool,
}

impl StageOutcome {
    pub fn new(status: StageStatus, started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> Self {
        let duration_seconds =
            ((completed_at - started_at).num_milliseconds().max(0) as f64) / 1000.0;
        Self {
            status,
            processed: 0,
            completed: 0,
            failed: 0,
            started_at,
            completed_at,
            duration_seconds,
            error: None,
            retryable: false,
        }
    }

    pub fn skipped(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> Self {
        Self::new(StageStatus::Skipped, started_at, completed_at)
    }

    pub fn with_counts(mut self, processed: u32, completed: u32, failed: u32) -> Self {
        self.processed = processed;
        self.completed = completed;
        self.failed = failed;
        self
    }

    /// Attach error text and the retry marker derived from the error kind.
    pub fn with_error(mut self, error: &PipelineError) -> Self {
        self.error = Some(error.to_string());
        self.retryable = error.is_retryable();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

// ============================================================================
// Company Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    #[default]
    Pending,
    Success,
    Partial,
    Failed,
}

impl CompanyStatus {
    /// Derive a company's day status from the outcomes of its enabled stages.
    ///
    /// Only stages that reported success or failure count. Skipped stages and
    /// stages with no outcome yet are ignored.
    pub fn derive(enabled: &[Stage], outcomes: &BTreeMap<Stage, StageOutcome>) -> Self {
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for stage in enabled {
            match outcomes.get(stage).map(|o| o.status) {
                Some(StageStatus::Success) => succeeded += 1,
                Some(StageStatus::Failed) => failed += 1,
                Some(StageStatus::Skipped) | None => {}
            }
        }

        match (succeeded, failed) {
            (0, 0) => CompanyStatus::Pending,
            (_, 0) => CompanyStatus::Success,
            (0, _) => CompanyStatus::Failed,
            _ => CompanyStatus::Partial,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyStatus::Pending => "pending",
            CompanyStatus::Success => "success",
            CompanyStatus::Partial => "partial",
            CompanyStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CompanyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Company Daily Metrics
// ============================================================================

/// Company-level fields written at settlement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySummary {
    pub new_jobs: u32,
    pub active_jobs: u32,
    pub inactive_jobs: u32,
    pub jobs_deactivated: u32,
    pub overall_status: CompanyStatus,
}

/// One document per company per local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyDailyMetrics {
    pub date: NaiveDate,
    pub company_name: String,
    #[serde(default)]
    pub stage_outcomes: BTreeMap<Stage, StageOutcome>,
    #[serde(default)]
    pub new_jobs_found: u32,
    #[serde(default)]
    pub total_active_jobs: u32,
    #[serde(default)]
    pub total_inactive_jobs: u32,
    #[serde(default)]
    pub jobs_deactivated_today: u32,
    #[serde(default)]
    pub overall_status: CompanyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CompanyDailyMetrics {
    pub fn new(date: NaiveDate, company_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            date,
            company_name: company_name.into(),
            stage_outcomes: BTreeMap::new(),
            new_jobs_found: 0,
            total_active_jobs: 0,
            total_inactive_jobs: 0,
            jobs_deactivated_today: 0,
            overall_status: CompanyStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace one stage's outcome, leaving the others intact.
    pub fn apply_stage(&mut self, stage: Stage, outcome: StageOutcome, now: DateTime<Utc>) {
        self.stage_outcomes.insert(stage, outcome);
        self.updated_at = now;
    }

    pub fn apply_summary(&mut self, summary: &CompanySummary, now: DateTime<Utc>) {
        self.new_jobs_found = summary.new_jobs;
        self.total_active_jobs = summary.active_jobs;
        self.total_inactive_jobs = summary.inactive_jobs;
        self.jobs_deactivated_today = summary.jobs_deactivated;
        self.overall_status = summary.overall_status;
        self.updated_at = now;
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stage_outcomes.get(&stage)
    }

    /// Flat key/value form (`stage_2_status`, `stage_2_jobs_processed`, ...)
    /// for stores and dashboards that want one column per field.
    pub fn to_flat_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("date".into(), json!(self.date.format("%Y-%m-%d").to_string()));
        doc.insert("company_name".into(), json!(self.company_name));
        doc.insert("new_jobs_found".into(), json!(self.new_jobs_found));
        doc.insert("total_active_jobs".into(), json!(self.total_active_jobs));
        doc.insert("total_inactive_jobs".into(), json!(self.total_inactive_jobs));
        doc.insert("jobs_deactivated_today".into(), json!(self.jobs_deactivated_today));
        doc.insert("overall_status".into(), json!(self.overall_status.as_str()));

        for (stage, outcome) in &self.stage_outcomes {
            let prefix = stage.tag();
            doc.insert(format!("{prefix}_status"), json!(outcome.status.as_str()));
            doc.insert(format!("{prefix}_jobs_processed"), json!(outcome.processed));
            doc.insert(format!("{prefix}_jobs_completed"), json!(outcome.completed));
            doc.insert(format!("{prefix}_jobs_failed"), json!(outcome.failed));
            doc.insert(format!("{prefix}_execution_seconds"), json!(outcome.duration_seconds));
            doc.insert(format!("{prefix}_started_at"), json!(outcome.started_at.to_rfc3339()));
            doc.insert(format!("{prefix}_completed_at"), json!(outcome.completed_at.to_rfc3339()));
            doc.insert(format!("{prefix}_error"), json!(outcome.error));
            doc.insert(format!("{prefix}_retryable"), json!(outcome.retryable));
        }

        doc.insert("created_at".into(), json!(self.created_at.to_rfc3339()));
        doc.insert("updated_at".into(), json!(self.updated_at.to_rfc3339()));
        Value::Object(doc)
    }
}

// ============================================================================
// Daily Aggregate Metrics
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageAggregate {
    pub total_processed: u32,
    pub total_completed: u32,
    pub total_failed: u32,
    pub success_rate: f64,
    pub avg_execution_seconds: f64,
}

/// Pipeline-wide rollup of every company's metrics for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregateMetrics {
    pub date: NaiveDate,
    pub total_companies: u32,
    pub companies_successful: u32,
    pub companies_partial: u32,
    pub companies_failed: u32,
    pub overall_success_rate: f64,
    pub total_new_jobs: u32,
    pub total_jobs_deactivated: u32,
    pub total_active_jobs: u32,
    pub total_inactive_jobs: u32,
    pub net_job_change: i64,
    pub stages: BTreeMap<Stage, StageAggregate>,
    /// Company documents rolled into this aggregate.
    pub pipeline_run_count: u32,
    pub calculated_at: DateTime<Utc>,
}

impl DailyAggregateMetrics {
    /// Roll up company documents. `None` when there is nothing to roll up.
    ///
    /// Recomputing from the same documents gives the same numbers; nothing
    /// accumulates across calls.
    pub fn from_company_metrics(
        date: NaiveDate,
        metrics: &[CompanyDailyMetrics],
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if metrics.is_empty() {
            return None;
        }

        let total_companies = metrics.len() as u32;
        let count_status = |status: CompanyStatus| {
            metrics.iter().filter(|m| m.overall_status == status).count() as u32
        };
        let companies_successful = count_status(CompanyStatus::Success);

        let total_new_jobs: u32 = metrics.iter().map(|m| m.new_jobs_found).sum();
        let total_jobs_deactivated: u32 = metrics.iter().map(|m| m.jobs_deactivated_today).sum();

        let stages = Stage::ALL
            .into_iter()
            .map(|stage| {
                let outcomes: Vec<&StageOutcome> =
                    metrics.iter().filter_map(|m| m.stage(stage)).collect();
                (stage, aggregate_stage(&outcomes))
            })
            .collect();

        Some(Self {
            date,
            total_companies,
            companies_successful,
            companies_partial: count_status(CompanyStatus::Partial),
            companies_failed: count_status(CompanyStatus::Failed),
            overall_success_rate: percentage(companies_successful, total_companies),
            total_new_jobs,
            total_jobs_deactivated,
            total_active_jobs: metrics.iter().map(|m| m.total_active_jobs).sum(),
            total_inactive_jobs: metrics.iter().map(|m| m.total_inactive_jobs).sum(),
            net_job_change: total_new_jobs as i64 - total_jobs_deactivated as i64,
            stages,
            pipeline_run_count: total_companies,
            calculated_at: now,
        })
    }

    pub fn stage(&self, stage: Stage) -> StageAggregate {
        self.stages.get(&stage).cloned().unwrap_or_default()
    }
}

fn aggregate_stage(outcomes: &[&StageOutcome]) -> StageAggregate {
    let total_processed: u32 = outcomes.iter().map(|o| o.processed).sum();
    let total_completed: u32 = outcomes.iter().map(|o| o.completed).sum();
    let total_failed: u32 = outcomes.iter().map(|o| o.failed).sum();

    // Zero durations are units that never ran
    let durations: Vec<f64> = outcomes
        .iter()
        .map(|o| o.duration_seconds)
        .filter(|d| *d > 0.0)
        .collect();
    let avg_execution_seconds = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };

    StageAggregate {
        total_processed,
        total_completed,
        total_failed,
        success_rate: percentage(total_completed, total_processed),
        avg_execution_seconds,
    }
}

fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}
