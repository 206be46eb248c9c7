//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use crate::error::{PipelineError, Result};
use crate::signature::JobSignature;
use crate::traits::store::{CreateOutcome, JobStore, MetricsStore};
use crate::types::{
    CompanyDailyMetrics, CompanySummary, DailyAggregateMetrics, JobRecord, Stage, StageOutcome,
};

/// In-memory storage for job records and metrics.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    jobs: RwLock<HashMap<JobSignature, JobRecord>>,
    company_metrics: RwLock<BTreeMap<(NaiveDate, String), CompanyDailyMetrics>>,
    aggregates: RwLock<BTreeMap<NaiveDate, DailyAggregateMetrics>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            company_metrics: RwLock::new(BTreeMap::new()),
            aggregates: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored job records.
    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// All stored job records, in no particular order.
    pub fn all_jobs(&self) -> Vec<JobRecord> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Insert or replace a record without the upsert rules. For seeding.
    pub fn put_job(&self, job: JobRecord) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.signature.clone(), job);
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.company_metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.aggregates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn company_jobs<F>(&self, company: &str, keep: F) -> Vec<JobRecord>
    where
        F: Fn(&JobRecord) -> bool,
    {
        let mut jobs: Vec<JobRecord> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|job| job.company == company && keep(*job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.url.cmp(&b.url)));
        jobs
    }

    fn with_company_document<F>(&self, date: NaiveDate, company: &str, apply: F)
    where
        F: FnOnce(&mut CompanyDailyMetrics),
    {
        let now = Utc::now();
        let mut metrics = self
            .company_metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let doc = metrics
            .entry((date, company.to_string()))
            .or_insert_with(|| CompanyDailyMetrics::new(date, company, now));
        apply(doc);
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &JobRecord) -> Result<CreateOutcome> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&job.signature) {
            return Ok(CreateOutcome::Existing);
        }
        jobs.insert(job.signature.clone(), job.clone());
        Ok(CreateOutcome::Created)
    }

    async fn update_job(&self, job: &JobRecord) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let Some(existing) = jobs.get_mut(&job.signature) else {
            return Err(PipelineError::storage(format!(
                "no job with signature {}",
                job.signature.short()
            )));
        };
        let completion = existing.completion.union(&job.completion);
        *existing = job.clone();
        existing.completion = completion;
        Ok(())
    }

    async fn find_by_signature(&self, signature: &JobSignature) -> Result<Option<JobRecord>> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(signature)
            .cloned())
    }

    async fn find_by_company_and_stage(&self, company: &str, stage: Stage) -> Result<Vec<JobRecord>> {
        Ok(self.company_jobs(company, |job| job.is_pending_for(stage)))
    }

    async fn signatures_for_company(&self, company: &str) -> Result<HashSet<JobSignature>> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|job| job.company == company)
            .map(|job| job.signature.clone())
            .collect())
    }

    async fn active_jobs_for_company(&self, company: &str) -> Result<Vec<JobRecord>> {
        Ok(self.company_jobs(company, |job| job.active))
    }

    async fn jobs_for_company(&self, company: &str) -> Result<Vec<JobRecord>> {
        Ok(self.company_jobs(company, |_| true))
    }

    async fn remove_incomplete_jobs(&self, company: &str, through: Stage) -> Result<u32> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|_, job| job.company != company || !job.active || job.is_completed(through));
        u32::try_from(before - jobs.len()).map_err(PipelineError::storage)
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn upsert_stage_outcome(
        &self,
        date: NaiveDate,
        company: &str,
        stage: Stage,
        outcome: &StageOutcome,
    ) -> Result<()> {
        self.with_company_document(date, company, |doc| {
            doc.apply_stage(stage, outcome.clone(), Utc::now())
        });
        Ok(())
    }

    async fn upsert_company_summary(
        &self,
        date: NaiveDate,
        company: &str,
        summary: &CompanySummary,
    ) -> Result<()> {
        self.with_company_document(date, company, |doc| doc.apply_summary(summary, Utc::now()));
        Ok(())
    }

    async fn company_metrics(
        &self,
        date: NaiveDate,
        company: &str,
    ) -> Result<Option<CompanyDailyMetrics>> {
        Ok(self
            .company_metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(date, company.to_string()))
            .cloned())
    }

    async fn company_metrics_range(
        &self,
        company: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompanyDailyMetrics>> {
        Ok(self
            .company_metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|m| m.company_name == company && m.date >= start && m.date <= end)
            .cloned()
            .collect())
    }

    async fn metrics_for_date(&self, date: NaiveDate) -> Result<Vec<CompanyDailyMetrics>> {
        Ok(self
            .company_metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|m| m.date == date)
            .cloned()
            .collect())
    }

    async fn upsert_daily_aggregate(&self, aggregate: &DailyAggregateMetrics) -> Result<()> {
        self.aggregates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(aggregate.date, aggregate.clone());
        Ok(())
    }

    async fn daily_aggregate(&self, date: NaiveDate) -> Result<Option<DailyAggregateMetrics>> {
        Ok(self
            .aggregates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&date)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StageCompletion, StageStatus};

    fn job(url: &str) -> JobRecord {
        JobRecord::discovered("Engineer", url, "Acme", Utc::now())
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn test_create_is_upsert_by_signature() {
        let store = MemoryStore::new();
        let first = job("https://acme.test/jobs/1");

        assert_eq!(store.create_job(&first).await.unwrap(), CreateOutcome::Created);

        let mut again = first.clone();
        again.title = "Renamed".into();
        assert_eq!(store.create_job(&again).await.unwrap(), CreateOutcome::Existing);

        let stored = store.find_by_signature(&first.signature).await.unwrap().unwrap();
        assert_eq!(stored.title, "Engineer");
        assert_eq!(store.job_count(), 1);
    }

    #[tokio::test]
    async fn test_update_never_clears_flags() {
        let store = MemoryStore::new();
        let mut stored = job("https://acme.test/jobs/1");
        stored.completion.stage_2_completed = true;
        store.put_job(stored.clone());

        let stale = job("https://acme.test/jobs/1");
        store.update_job(&stale).await.unwrap();

        let reloaded = store.find_by_signature(&stored.signature).await.unwrap().unwrap();
        assert!(reloaded.is_completed(Stage::Details));
    }

    #[tokio::test]
    async fn test_update_missing_job_fails() {
        let store = MemoryStore::new();
        let err = store.update_job(&job("https://acme.test/jobs/9")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_remove_incomplete_jobs() {
        let store = MemoryStore::new();
        let fresh = job("https://acme.test/jobs/1");
        let mut finished = job("https://acme.test/jobs/2");
        finished.completion = StageCompletion {
            stage_1_completed: true,
            stage_2_completed: true,
            stage_3_completed: true,
            stage_4_completed: true,
        };
        let mut retired = job("https://acme.test/jobs/3");
        retired.deactivate(Utc::now());
        let other = JobRecord::discovered("Engineer", "https://other.test/jobs/1", "Other", Utc::now());

        for j in [&fresh, &finished, &retired, &other] {
            store.create_job(j).await.unwrap();
        }

        let removed = store.remove_incomplete_jobs("Acme", Stage::Technologies).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_by_signature(&fresh.signature).await.unwrap().is_none());
        assert!(store.find_by_signature(&retired.signature).await.unwrap().is_some());
        assert!(store.find_by_signature(&other.signature).await.unwrap().is_some());
        assert_eq!(store.job_count(), 3);

        // Every record has finished stage 1
        assert_eq!(store.remove_incomplete_jobs("Acme", Stage::Listing).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_by_company_and_stage() {
        let store = MemoryStore::new();
        let pending = job("https://acme.test/jobs/1");
        let mut done = job("https://acme.test/jobs/2");
        done.completion.stage_2_completed = true;
        let mut inactive = job("https://acme.test/jobs/3");
        inactive.deactivate(Utc::now());
        let other = JobRecord::discovered("Engineer", "https://other.test/jobs/1", "Other", Utc::now());

        for j in [&pending, &done, &inactive, &other] {
            store.create_job(j).await.unwrap();
        }

        let found = store.find_by_company_and_stage("Acme", Stage::Details).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].signature, pending.signature);

        let next = store.find_by_company_and_stage("Acme", Stage::Requirements).await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].signature, done.signature);

        assert_eq!(store.signatures_for_company("Acme").await.unwrap().len(), 3);
        assert_eq!(store.active_jobs_for_company("Acme").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stage_outcomes_merge_per_document() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .upsert_stage_outcome(day(), "Acme", Stage::Listing, &StageOutcome::new(StageStatus::Success, now, now))
            .await
            .unwrap();
        store
            .upsert_stage_outcome(day(), "Acme", Stage::Details, &StageOutcome::new(StageStatus::Failed, now, now))
            .await
            .unwrap();

        let doc = store.company_metrics(day(), "Acme").await.unwrap().unwrap();
        assert_eq!(doc.stage_outcomes.len(), 2);
        assert_eq!(store.metrics_for_date(day()).await.unwrap().len(), 1);

        let next_day = day().succ_opt().unwrap();
        assert!(store.company_metrics(next_day, "Acme").await.unwrap().is_none());
        let range = store.company_metrics_range("Acme", day(), next_day).await.unwrap();
        assert_eq!(range.len(), 1);
    }
}
