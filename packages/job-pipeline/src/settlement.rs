//! End-of-run settlement: per-company summaries and the daily aggregate.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::flow::StageReport;
use crate::metrics::MetricsRecorder;
use crate::traits::store::PipelineStore;
use crate::types::{Company, CompanyStatus, CompanySummary, DailyAggregateMetrics, JobRecord};

/// Job counts for one company on one local day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub new_jobs: u32,
    pub active_jobs: u32,
    pub inactive_jobs: u32,
    pub deactivated_today: u32,
}

impl JobStats {
    pub fn from_jobs(jobs: &[JobRecord], date: NaiveDate, config: &PipelineConfig) -> Self {
        let on_date = |at: DateTime<Utc>| config.local_date(at) == date;
        let mut stats = JobStats::default();

        for job in jobs {
            if on_date(job.created_at) {
                stats.new_jobs += 1;
            }
            if job.active {
                stats.active_jobs += 1;
            } else {
                stats.inactive_jobs += 1;
                if job.deactivated_at.is_some_and(on_date) {
                    stats.deactivated_today += 1;
                }
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettlementReport {
    pub summaries: BTreeMap<String, CompanySummary>,
    pub aggregate: Option<DailyAggregateMetrics>,
}

pub struct Settlement {
    store: Arc<dyn PipelineStore>,
    recorder: Arc<MetricsRecorder>,
    config: Arc<PipelineConfig>,
}

impl Settlement {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        recorder: Arc<MetricsRecorder>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            store,
            recorder,
            config,
        }
    }

    /// Summarize every enabled company, then recompute the daily aggregate.
    ///
    /// Failures are logged and leave the company out of the report.
    pub async fn settle(
        &self,
        companies: &[Company],
        stages: &[StageReport],
        date: NaiveDate,
    ) -> SettlementReport {
        let mut report = SettlementReport::default();

        for company in companies.iter().filter(|c| c.enabled) {
            match self.summarize(company, stages, date).await {
                Ok(summary) => {
                    self.recorder
                        .record_company_completion(&company.name, &summary, date)
                        .await;
                    report.summaries.insert(company.name.clone(), summary);
                }
                Err(e) => {
                    warn!(company = %company.name, error = %e, "could not settle company");
                }
            }
        }

        report.aggregate = self.recorder.calculate_daily_aggregates(date).await;
        info!(
            %date,
            companies = report.summaries.len(),
            aggregate = report.aggregate.is_some(),
            "settlement finished"
        );
        report
    }

    async fn summarize(
        &self,
        company: &Company,
        stages: &[StageReport],
        date: NaiveDate,
    ) -> Result<CompanySummary> {
        let jobs = self.store.jobs_for_company(&company.name).await?;
        let stats = JobStats::from_jobs(&jobs, date, &self.config);

        // Earlier runs of the same day count too; this run wins per stage.
        let mut outcomes = self
            .store
            .company_metrics(date, &company.name)
            .await?
            .map(|doc| doc.stage_outcomes)
            .unwrap_or_default();
        for stage_report in stages {
            if let Some(outcome) = stage_report.outcome(&company.name) {
                outcomes.insert(stage_report.stage, outcome.clone());
            }
        }

        let overall_status = CompanyStatus::derive(&self.config.enabled_stages(), &outcomes);

        Ok(CompanySummary {
            new_jobs: stats.new_jobs,
            active_jobs: stats.active_jobs,
            inactive_jobs: stats.inactive_jobs,
            jobs_deactivated: stats.deactivated_today,
            overall_status,
        })
    }
}
