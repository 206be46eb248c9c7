//! Stage processors.
//!
//! A stage processor runs one company unit: every item of one company for
//! one stage, in order. Stage 1 treats the company itself as the item;
//! stages 2-4 load the company's pending jobs and enrich them one by one
//! through a [`JobEnricher`].
//!
//! Item errors are handled by kind:
//! - validation: the item is counted failed and the unit moves on
//! - anything else: the unit stops; items already written stay written

mod details;
mod listing;
mod requirements;
mod technologies;

pub use details::DetailsEnricher;
pub use listing::ListingStage;
pub use requirements::RequirementsEnricher;
pub use technologies::TechnologiesEnricher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError, Result};
use crate::lifecycle::LifecycleManager;
use crate::signature::JobSignature;
use crate::traits::ai::{AiExtractor, AiRequest};
use crate::traits::store::PipelineStore;
use crate::traits::web::WebExtractor;
use crate::types::{Company, JobRecord, ParserStrategy, Stage, StageOutcome, StageStatus};

/// Shared collaborators for every stage processor.
pub struct StageContext {
    pub web: Arc<dyn WebExtractor>,
    pub ai: Arc<dyn AiExtractor>,
    pub store: Arc<dyn PipelineStore>,
    pub lifecycle: Arc<LifecycleManager>,
    pub config: Arc<PipelineConfig>,
}

impl StageContext {
    /// AI request pre-filled from the stage's configuration.
    pub fn request_for(&self, stage: Stage, context: impl Into<String>) -> Result<AiRequest> {
        let settings = self
            .config
            .stage(stage)
            .ok_or_else(|| PipelineError::Config(format!("{} is not configured", stage)))?;
        Ok(AiRequest::new(settings.prompt_template.clone(), context)
            .with_system_message(settings.system_message.clone())
            .with_response_schema(settings.response_schema.clone()))
    }

    /// Fetch a page. An empty page counts as a fetch failure.
    pub async fn fetch_page(
        &self,
        url: &str,
        selectors: &[String],
        strategy: &ParserStrategy,
    ) -> Result<String> {
        let content = self.web.fetch_content(url, selectors, strategy).await?;
        if content.trim().is_empty() {
            return Err(PipelineError::fetch(url, "no content extracted"));
        }
        Ok(content)
    }
}

/// What one company unit did.
#[derive(Debug, Default)]
pub struct UnitReport {
    /// Items the unit took on.
    pub processed: u32,
    /// Items whose output was persisted.
    pub completed: u32,
    /// Signatures seen on the listing (stage 1 only).
    pub observed: Option<HashSet<JobSignature>>,
    /// Error that stopped the unit early.
    pub error: Option<PipelineError>,
    /// Last validation message, for the "nothing succeeded" case.
    pub last_item_error: Option<String>,
}

impl UnitReport {
    pub fn aborted(error: PipelineError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Classify the unit into a stage outcome.
    ///
    /// Stage 1 succeeds unless the unit stopped early. Stages 2-4 are
    /// skipped when nothing was pending and failed when nothing committed.
    pub fn to_outcome(
        &self,
        stage: Stage,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> StageOutcome {
        let failed = self.processed.saturating_sub(self.completed);
        let counted = |status| {
            StageOutcome::new(status, started_at, completed_at).with_counts(
                self.processed,
                self.completed,
                failed,
            )
        };

        if let Some(error) = &self.error {
            return counted(StageStatus::Failed).with_error(error);
        }
        if stage == Stage::Listing {
            return counted(StageStatus::Success);
        }
        if self.processed == 0 {
            return counted(StageStatus::Skipped);
        }
        if self.completed == 0 {
            let message = match &self.last_item_error {
                Some(reason) => format!("no jobs successfully processed: {}", reason),
                None => "no jobs successfully processed".to_string(),
            };
            return counted(StageStatus::Failed).with_message(message);
        }
        counted(StageStatus::Success)
    }
}

/// Runs one company unit for one stage.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    fn stage(&self) -> Stage;

    /// Never returns an error; failures are folded into the report.
    async fn run_company(&self, company: &Company) -> UnitReport;
}

/// Produces the next version of a job for one enrichment stage.
///
/// The returned record must carry the stage's output and flag. Nothing is
/// persisted here.
#[async_trait]
pub trait JobEnricher: Send + Sync {
    fn stage(&self) -> Stage;

    async fn enrich(&self, company: &Company, job: &JobRecord) -> Result<JobRecord>;
}

/// Stage processor for stages 2-4: load pending jobs, enrich, persist.
pub struct EnrichmentStage<E> {
    ctx: Arc<StageContext>,
    enricher: E,
}

impl<E: JobEnricher> EnrichmentStage<E> {
    pub fn new(ctx: Arc<StageContext>, enricher: E) -> Self {
        Self { ctx, enricher }
    }

    async fn process_job(&self, company: &Company, job: &JobRecord) -> Result<()> {
        let next = self.enricher.enrich(company, job).await?;
        self.ctx.store.update_job(&next).await
    }
}

#[async_trait]
impl<E: JobEnricher> StageProcessor for EnrichmentStage<E> {
    fn stage(&self) -> Stage {
        self.enricher.stage()
    }

    async fn run_company(&self, company: &Company) -> UnitReport {
        let stage = self.stage();
        let jobs = match self
            .ctx
            .store
            .find_by_company_and_stage(&company.name, stage)
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => return UnitReport::aborted(e),
        };

        let mut report = UnitReport {
            processed: jobs.len() as u32,
            ..UnitReport::default()
        };

        if jobs.is_empty() {
            info!(company = %company.name, stage = %stage, "no jobs waiting for stage");
            return report;
        }

        info!(company = %company.name, stage = %stage, jobs = jobs.len(), "processing jobs");

        for job in &jobs {
            match self.process_job(company, job).await {
                Ok(()) => report.completed += 1,
                Err(e) if e.kind() == ErrorKind::ValidationFailed => {
                    warn!(
                        company = %company.name,
                        stage = %stage,
                        job = %job.title,
                        error = %e,
                        "job failed validation"
                    );
                    report.last_item_error = Some(e.to_string());
                }
                Err(e) => {
                    warn!(
                        company = %company.name,
                        stage = %stage,
                        job = %job.title,
                        error = %e,
                        completed = report.completed,
                        "stopping company unit"
                    );
                    report.error = Some(e);
                    break;
                }
            }
        }

        report
    }
}

/// Build the processor for a stage.
pub fn processor_for(stage: Stage, ctx: Arc<StageContext>) -> Arc<dyn StageProcessor> {
    match stage {
        Stage::Listing => Arc::new(ListingStage::new(ctx)),
        Stage::Details => {
            let enricher = DetailsEnricher::new(ctx.clone());
            Arc::new(EnrichmentStage::new(ctx, enricher))
        }
        Stage::Requirements => {
            let enricher = RequirementsEnricher::new(ctx.clone());
            Arc::new(EnrichmentStage::new(ctx, enricher))
        }
        Stage::Technologies => {
            let enricher = TechnologiesEnricher::new(ctx.clone());
            Arc::new(EnrichmentStage::new(ctx, enricher))
        }
    }
}
