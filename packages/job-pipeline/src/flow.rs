//! Concurrent execution of one stage across companies.
//!
//! One task per company unit, bounded by a semaphore. Each unit runs in
//! its own spawned task so a panic surfaces as a `JoinError` and becomes a
//! failed outcome for that company only. Stage metrics are recorded as
//! soon as a unit finishes.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{error, info, instrument, warn, Instrument};

use crate::error::PipelineError;
use crate::metrics::MetricsRecorder;
use crate::signature::JobSignature;
use crate::stages::{StageProcessor, UnitReport};
use crate::types::{Company, Stage, StageOutcome, StageStatus};

/// Result of one company unit.
#[derive(Debug, Clone)]
pub struct CompanyOutcome {
    pub company: String,
    pub stage: Stage,
    pub outcome: StageOutcome,
    /// Signatures seen on the listing. Stage 1 only.
    pub observed: Option<HashSet<JobSignature>>,
    pub metrics_recorded: bool,
}

/// Result of one stage across all enabled companies.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub companies: BTreeMap<String, CompanyOutcome>,
}

impl StageReport {
    pub fn outcome(&self, company: &str) -> Option<&StageOutcome> {
        self.companies.get(company).map(|c| &c.outcome)
    }

    /// True when at least one unit ran and every unit failed.
    pub fn all_failed(&self) -> bool {
        !self.companies.is_empty() && self.companies.values().all(|c| c.outcome.is_failed())
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.companies
            .values()
            .filter(|c| c.outcome.status == status)
            .count()
    }

    pub fn failed_companies(&self) -> Vec<&str> {
        self.companies_with(StageStatus::Failed)
    }

    pub fn succeeded_companies(&self) -> Vec<&str> {
        self.companies_with(StageStatus::Success)
    }

    fn companies_with(&self, status: StageStatus) -> Vec<&str> {
        self.companies
            .values()
            .filter(|c| c.outcome.status == status)
            .map(|c| c.company.as_str())
            .collect()
    }
}

pub struct StageFlow {
    concurrency: usize,
    recorder: Arc<MetricsRecorder>,
}

impl StageFlow {
    pub fn new(concurrency: usize, recorder: Arc<MetricsRecorder>) -> Self {
        Self {
            concurrency: concurrency.max(1),
            recorder,
        }
    }

    /// Run `processor` for every enabled company, at most `concurrency` at a time.
    ///
    /// Never fails: unit errors, panics and metrics write failures all end
    /// up in the report.
    pub async fn run(
        &self,
        processor: Arc<dyn StageProcessor>,
        companies: &[Company],
        date: NaiveDate,
    ) -> StageReport {
        let stage = processor.stage();
        let started_at = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let mut handles = Vec::with_capacity(companies.len());
        for company in companies.iter().filter(|c| c.enabled) {
            let name = company.name.clone();
            let task = run_unit(
                semaphore.clone(),
                processor.clone(),
                self.recorder.clone(),
                company.clone(),
                date,
            );
            handles.push((name, tokio::spawn(task)));
        }

        let mut companies = BTreeMap::new();
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let error = unexpected(&name, stage, e);
                    warn!(company = %name, stage = %stage, error = %error, "company unit crashed");
                    let now = Utc::now();
                    CompanyOutcome {
                        company: name.clone(),
                        stage,
                        outcome: UnitReport::aborted(error).to_outcome(stage, now, now),
                        observed: None,
                        metrics_recorded: false,
                    }
                }
            };
            companies.insert(name, result);
        }

        let report = StageReport {
            stage,
            started_at,
            completed_at: Utc::now(),
            companies,
        };

        info!(
            stage = %stage,
            succeeded = report.count(StageStatus::Success),
            failed = report.count(StageStatus::Failed),
            skipped = report.count(StageStatus::Skipped),
            "stage finished"
        );
        report
    }
}

#[instrument(
    name = "company_unit",
    skip_all,
    fields(company = %company.name, stage = %processor.stage())
)]
async fn run_unit(
    semaphore: Arc<Semaphore>,
    processor: Arc<dyn StageProcessor>,
    recorder: Arc<MetricsRecorder>,
    company: Company,
    date: NaiveDate,
) -> CompanyOutcome {
    let stage = processor.stage();
    let name = company.name.clone();

    let (report, started_at, completed_at) = match semaphore.acquire_owned().await {
        Ok(_permit) => {
            let started_at = Utc::now();
            let report = run_isolated(processor, company).await;
            (report, started_at, Utc::now())
        }
        Err(e) => {
            let now = Utc::now();
            let error = PipelineError::Unexpected {
                company: name.clone(),
                stage,
                message: e.to_string(),
            };
            (UnitReport::aborted(error), now, now)
        }
    };

    let outcome = report.to_outcome(stage, started_at, completed_at);
    if let Some(error) = &report.error {
        error!(error = %error, retryable = outcome.retryable, "company unit failed");
    }

    let metrics_recorded = recorder
        .record_stage_metrics(&name, stage, &outcome, date)
        .await;

    CompanyOutcome {
        company: name,
        stage,
        outcome,
        observed: report.observed,
        metrics_recorded,
    }
}

async fn run_isolated(processor: Arc<dyn StageProcessor>, company: Company) -> UnitReport {
    let stage = processor.stage();
    let name = company.name.clone();

    let task = async move { processor.run_company(&company).await };
    match tokio::spawn(task.in_current_span()).await {
        Ok(report) => report,
        Err(e) => UnitReport::aborted(unexpected(&name, stage, e)),
    }
}

fn unexpected(company: &str, stage: Stage, error: JoinError) -> PipelineError {
    let message = if error.is_panic() {
        let payload = error.into_panic();
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .map(|s| format!("panicked: {s}"))
            .unwrap_or_else(|| "panicked".to_string())
    } else {
        error.to_string()
    };
    PipelineError::Unexpected {
        company: company.to_string(),
        stage,
        message,
    }
}
