//! Pipeline driver: one run over every company, stage by stage.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::flow::{StageFlow, StageReport};
use crate::lifecycle::{LifecycleManager, SweepReport};
use crate::metrics::MetricsRecorder;
use crate::settlement::Settlement;
use crate::stages::{processor_for, StageContext};
use crate::traits::ai::AiExtractor;
use crate::traits::registry::CompanyRegistry;
use crate::traits::store::PipelineStore;
use crate::traits::web::WebExtractor;
use crate::types::{Company, CompanySummary, DailyAggregateMetrics, Stage};

/// Collaborators injected into a [`Pipeline`].
#[derive(TypedBuilder)]
pub struct PipelineDeps {
    pub registry: Arc<dyn CompanyRegistry>,
    pub web: Arc<dyn WebExtractor>,
    pub ai: Arc<dyn AiExtractor>,
    pub store: Arc<dyn PipelineStore>,
}

/// Everything one run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Local calendar day the run's metrics were filed under.
    ///
    /// Taken once when the run starts. A run that crosses local midnight
    /// files every stage outcome and its settlement under the start day, so
    /// one run never splits across two company documents.
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
    /// Enabled stages that did not run because an earlier stage failed everywhere.
    pub halted_stages: Vec<Stage>,
    /// Incomplete jobs deleted per company before stage 1, when enabled.
    pub removed_incomplete: BTreeMap<String, u32>,
    pub sweeps: BTreeMap<String, SweepReport>,
    pub summaries: BTreeMap<String, CompanySummary>,
    pub aggregate: Option<DailyAggregateMetrics>,
}

impl RunReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn summary(&self, company: &str) -> Option<&CompanySummary> {
        self.summaries.get(company)
    }

    pub fn total_sweep(&self) -> SweepReport {
        self.sweeps
            .values()
            .fold(SweepReport::default(), |acc, s| acc.merge(*s))
    }
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    registry: Arc<dyn CompanyRegistry>,
    ai: Arc<dyn AiExtractor>,
    store: Arc<dyn PipelineStore>,
    ctx: Arc<StageContext>,
    lifecycle: Arc<LifecycleManager>,
    recorder: Arc<MetricsRecorder>,
    flow: StageFlow,
    settlement: Settlement,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, deps: PipelineDeps) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let lifecycle = Arc::new(LifecycleManager::new(deps.store.clone()));
        let recorder = Arc::new(MetricsRecorder::new(deps.store.clone(), config.retry.clone()));
        let ctx = Arc::new(StageContext {
            web: deps.web,
            ai: deps.ai.clone(),
            store: deps.store.clone(),
            lifecycle: lifecycle.clone(),
            config: config.clone(),
        });

        Ok(Self {
            flow: StageFlow::new(config.concurrency, recorder.clone()),
            settlement: Settlement::new(deps.store.clone(), recorder.clone(), config.clone()),
            registry: deps.registry,
            ai: deps.ai,
            store: deps.store,
            ctx,
            lifecycle,
            recorder,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Metrics queries over the same store.
    pub fn metrics(&self) -> &MetricsRecorder {
        &self.recorder
    }

    pub fn store(&self) -> &Arc<dyn PipelineStore> {
        &self.store
    }

    /// Run every enabled stage, then settle.
    ///
    /// Fails only when the registry cannot be read or the inputs are
    /// unusable. Company-level failures are in the report and the metrics.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::now_v7();
        let span = info_span!("pipeline_run", %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunReport> {
        let started_at = Utc::now();
        let date = self.config.local_date(started_at);

        let companies = self.registry.list_companies().await?;
        self.validate_inputs(&companies)?;

        info!(
            %date,
            companies = companies.len(),
            stages = ?self.config.enabled_stages(),
            "pipeline run started"
        );

        let removed_incomplete = if self.config.remove_incomplete_jobs {
            self.remove_incomplete(&companies).await
        } else {
            BTreeMap::new()
        };

        let mut stages = Vec::new();
        let mut halted_stages = Vec::new();
        let mut sweeps = BTreeMap::new();
        let mut halted_after: Option<Stage> = None;

        for stage in self.config.enabled_stages() {
            if let Some(failed_stage) = halted_after {
                warn!(stage = %stage, after = %failed_stage, "stage skipped");
                halted_stages.push(stage);
                continue;
            }

            let report = self
                .flow
                .run(processor_for(stage, self.ctx.clone()), &companies, date)
                .await;

            if stage == Stage::Listing {
                sweeps = self.sweep(&report).await;
            }

            if self.config.halt_on_total_stage_failure && report.all_failed() {
                warn!(stage = %stage, "every company failed the stage; halting");
                halted_after = Some(stage);
            }
            stages.push(report);
        }

        let settled = self.settlement.settle(&companies, &stages, date).await;

        let report = RunReport {
            run_id,
            date,
            started_at,
            completed_at: Utc::now(),
            stages,
            halted_stages,
            removed_incomplete,
            sweeps,
            summaries: settled.summaries,
            aggregate: settled.aggregate,
        };

        info!(
            stages_run = report.stages.len(),
            stages_halted = report.halted_stages.len(),
            deactivated = report.total_sweep().deactivated,
            "pipeline run finished"
        );
        Ok(report)
    }

    fn validate_inputs(&self, companies: &[Company]) -> Result<()> {
        if companies.is_empty() {
            return Err(PipelineError::InvalidInput("no companies configured".into()));
        }
        if !companies.iter().any(|c| c.enabled) {
            return Err(PipelineError::InvalidInput("no enabled companies".into()));
        }

        let enabled = self.config.enabled_stages();
        if enabled.is_empty() {
            return Err(PipelineError::InvalidInput("no stages enabled".into()));
        }
        for stage in enabled {
            let Some(settings) = self.config.stage(stage) else {
                return Err(PipelineError::InvalidInput(format!("{stage} is not configured")));
            };
            if !self.ai.knows_template(&settings.prompt_template) {
                return Err(PipelineError::InvalidInput(format!(
                    "unknown prompt template '{}' for {}",
                    settings.prompt_template, stage
                )));
            }
        }
        Ok(())
    }

    /// Delete each enabled company's jobs left unfinished by earlier runs.
    ///
    /// Best-effort: a failed delete is logged and the run goes on.
    async fn remove_incomplete(&self, companies: &[Company]) -> BTreeMap<String, u32> {
        let mut removed = BTreeMap::new();
        let Some(through) = self.config.enabled_stages().last().copied() else {
            return removed;
        };

        for company in companies.iter().filter(|c| c.enabled) {
            match self.store.remove_incomplete_jobs(&company.name, through).await {
                Ok(count) => {
                    removed.insert(company.name.clone(), count);
                }
                Err(e) => {
                    warn!(company = %company.name, error = %e, "failed to remove incomplete jobs")
                }
            }
        }

        info!(
            removed = removed.values().sum::<u32>(),
            through = %through,
            "removed incomplete jobs from previous runs"
        );
        removed
    }

    /// Lifecycle sweep for every company whose listing succeeded.
    async fn sweep(&self, listing: &StageReport) -> BTreeMap<String, SweepReport> {
        let now = Utc::now();
        let mut sweeps = BTreeMap::new();

        for unit in listing.companies.values() {
            if !unit.outcome.is_success() {
                continue;
            }
            let Some(observed) = &unit.observed else {
                continue;
            };

            let mut report = SweepReport::default();
            if self.config.reactivate_reappeared {
                match self.lifecycle.reactivate_observed(&unit.company, observed, now).await {
                    Ok(r) => report = report.merge(r),
                    Err(e) => warn!(company = %unit.company, error = %e, "reactivation sweep failed"),
                }
            }
            match self.lifecycle.deactivate_missing(&unit.company, observed, now).await {
                Ok(r) => report = report.merge(r),
                Err(e) => warn!(company = %unit.company, error = %e, "deactivation sweep failed"),
            }
            sweeps.insert(unit.company.clone(), report);
        }
        sweeps
    }
}
