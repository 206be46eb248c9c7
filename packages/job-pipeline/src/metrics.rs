//! Metrics recording and daily aggregation.
//!
//! Writes go through [`retry_with_backoff`]. Metrics are telemetry: a write
//! that fails every attempt is logged and reported as `false`, never raised.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RetryPolicy;
use crate::error::Result;
use crate::retry::retry_with_backoff;
use crate::traits::store::PipelineStore;
use crate::types::{
    CompanyDailyMetrics, CompanyStatus, CompanySummary, DailyAggregateMetrics, Stage, StageOutcome,
};

pub struct MetricsRecorder {
    store: Arc<dyn PipelineStore>,
    retry: RetryPolicy,
}

impl MetricsRecorder {
    pub fn new(store: Arc<dyn PipelineStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Upsert one company's outcome for one stage. Returns whether it was stored.
    pub async fn record_stage_metrics(
        &self,
        company: &str,
        stage: Stage,
        outcome: &StageOutcome,
        date: NaiveDate,
    ) -> bool {
        let operation = format!("record_stage_metrics for {company} {stage}");
        let result = retry_with_backoff(&self.retry, &operation, || {
            self.store.upsert_stage_outcome(date, company, stage, outcome)
        })
        .await;

        match result {
            Ok(()) => {
                info!(
                    company,
                    stage = %stage,
                    status = %outcome.status,
                    processed = outcome.processed,
                    completed = outcome.completed,
                    duration_seconds = outcome.duration_seconds,
                    "recorded stage metrics"
                );
                true
            }
            Err(e) => {
                warn!(company, stage = %stage, error = %e, "stage metrics not recorded");
                false
            }
        }
    }

    /// Upsert a company's settlement summary. Returns whether it was stored.
    pub async fn record_company_completion(
        &self,
        company: &str,
        summary: &CompanySummary,
        date: NaiveDate,
    ) -> bool {
        let operation = format!("record_company_completion for {company}");
        let result = retry_with_backoff(&self.retry, &operation, || {
            self.store.upsert_company_summary(date, company, summary)
        })
        .await;

        match result {
            Ok(()) => {
                info!(
                    company,
                    status = %summary.overall_status,
                    new_jobs = summary.new_jobs,
                    active_jobs = summary.active_jobs,
                    deactivated = summary.jobs_deactivated,
                    "recorded company completion"
                );
                true
            }
            Err(e) => {
                warn!(company, error = %e, "company completion not recorded");
                false
            }
        }
    }

    /// Recompute and store the pipeline-wide aggregate for `date`.
    ///
    /// `None` when there are no company metrics for the date or they could
    /// not be read. The computed aggregate is returned even if storing it
    /// failed.
    pub async fn calculate_daily_aggregates(&self, date: NaiveDate) -> Option<DailyAggregateMetrics> {
        let operation = format!("load metrics for {date}");
        let metrics = match retry_with_backoff(&self.retry, &operation, || {
            self.store.metrics_for_date(date)
        })
        .await
        {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(%date, error = %e, "could not load company metrics");
                return None;
            }
        };

        let Some(aggregate) = DailyAggregateMetrics::from_company_metrics(date, &metrics, Utc::now())
        else {
            warn!(%date, "no company metrics to aggregate");
            return None;
        };

        let operation = format!("calculate_daily_aggregates for {date}");
        match retry_with_backoff(&self.retry, &operation, || {
            self.store.upsert_daily_aggregate(&aggregate)
        })
        .await
        {
            Ok(()) => info!(
                %date,
                companies = aggregate.total_companies,
                success_rate = aggregate.overall_success_rate,
                net_job_change = aggregate.net_job_change,
                "calculated daily aggregates"
            ),
            Err(e) => warn!(%date, error = %e, "daily aggregates not stored"),
        }

        Some(aggregate)
    }

    /// A company's documents between two dates, inclusive.
    pub async fn company_metrics(
        &self,
        company: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompanyDailyMetrics>> {
        self.store.company_metrics_range(company, start, end).await
    }

    /// Stored aggregate for a day.
    pub async fn pipeline_health(&self, date: NaiveDate) -> Result<Option<DailyAggregateMetrics>> {
        self.store.daily_aggregate(date).await
    }

    /// Company documents for a day with the given status, by company name.
    pub async fn companies_by_status(
        &self,
        date: NaiveDate,
        status: CompanyStatus,
    ) -> Result<Vec<CompanyDailyMetrics>> {
        let mut matching: Vec<_> = self
            .store
            .metrics_for_date(date)
            .await?
            .into_iter()
            .filter(|m| m.overall_status == status)
            .collect();
        matching.sort_by(|a, b| a.company_name.cmp(&b.company_name));
        Ok(matching)
    }
}
