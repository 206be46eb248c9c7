//! Deduplication and active/inactive lifecycle of job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::signature::JobSignature;
use crate::traits::store::PipelineStore;
use crate::types::JobRecord;

/// Result of a lifecycle sweep over one company.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub deactivated: u32,
    pub reactivated: u32,
    /// Records whose write failed. The sweep carries on past them.
    pub failed: u32,
}

impl SweepReport {
    pub fn merge(self, other: SweepReport) -> SweepReport {
        SweepReport {
            deactivated: self.deactivated + other.deactivated,
            reactivated: self.reactivated + other.reactivated,
            failed: self.failed + other.failed,
        }
    }
}

/// Decides which scraped postings are new and retires postings that
/// disappeared from a company's listing.
pub struct LifecycleManager {
    store: Arc<dyn PipelineStore>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self { store }
    }

    /// Drop candidates already stored for the company, and repeats within
    /// the batch. Read-only.
    pub async fn filter_new(&self, company: &str, candidates: Vec<JobRecord>) -> Result<Vec<JobRecord>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let existing = self.store.signatures_for_company(company).await?;
        let total = candidates.len();
        let mut seen: HashSet<JobSignature> = HashSet::with_capacity(total);

        let fresh: Vec<JobRecord> = candidates
            .into_iter()
            .filter(|job| !existing.contains(&job.signature))
            .filter(|job| seen.insert(job.signature.clone()))
            .collect();

        if fresh.len() < total {
            info!(
                company,
                filtered = total - fresh.len(),
                new = fresh.len(),
                "filtered out known jobs"
            );
        }
        Ok(fresh)
    }

    /// Mark every active record of the company whose signature is not in
    /// `current` as inactive.
    ///
    /// Best-effort: a failed write is logged and counted, the sweep goes on.
    pub async fn deactivate_missing(
        &self,
        company: &str,
        current: &HashSet<JobSignature>,
        now: DateTime<Utc>,
    ) -> Result<SweepReport> {
        let active = self.store.active_jobs_for_company(company).await?;
        let mut report = SweepReport::default();

        for mut job in active.into_iter().filter(|j| !current.contains(&j.signature)) {
            job.deactivate(now);
            match self.store.update_job(&job).await {
                Ok(()) => {
                    debug!(company, signature = job.signature.short(), title = %job.title, "job deactivated");
                    report.deactivated += 1;
                }
                Err(e) => {
                    warn!(company, signature = job.signature.short(), error = %e, "failed to deactivate job");
                    report.failed += 1;
                }
            }
        }

        if report.deactivated > 0 {
            info!(company, deactivated = report.deactivated, "deactivated jobs no longer listed");
        }
        Ok(report)
    }

    /// Flip inactive records whose signature is back in `current` to active.
    pub async fn reactivate_observed(
        &self,
        company: &str,
        current: &HashSet<JobSignature>,
        now: DateTime<Utc>,
    ) -> Result<SweepReport> {
        let jobs = self.store.jobs_for_company(company).await?;
        let mut report = SweepReport::default();

        for mut job in jobs
            .into_iter()
            .filter(|j| !j.active && current.contains(&j.signature))
        {
            job.reactivate(now);
            match self.store.update_job(&job).await {
                Ok(()) => report.reactivated += 1,
                Err(e) => {
                    warn!(company, signature = job.signature.short(), error = %e, "failed to reactivate job");
                    report.failed += 1;
                }
            }
        }

        if report.reactivated > 0 {
            info!(company, reactivated = report.reactivated, "reactivated relisted jobs");
        }
        Ok(report)
    }
}
