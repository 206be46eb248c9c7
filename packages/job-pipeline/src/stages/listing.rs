//! Stage 1: discover job postings on a company's career page.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::{StageContext, StageProcessor, UnitReport};
use crate::error::{PipelineError, Result};
use crate::mapping::map_listing;
use crate::types::{Company, JobRecord, Stage};

pub struct ListingStage {
    ctx: Arc<StageContext>,
}

impl ListingStage {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    /// Fetch the career page and map the AI response into candidates.
    async fn discover(&self, company: &Company) -> Result<Vec<JobRecord>> {
        company.validate().map_err(PipelineError::validation)?;

        let content = self
            .ctx
            .fetch_page(
                &company.career_url,
                &company.web_parser.selectors.job_board,
                &company.web_parser.strategy,
            )
            .await?;

        let request = self
            .ctx
            .request_for(Stage::Listing, company.name.clone())?
            .with_variable("html_content", content)
            .with_variable("career_url", company.career_url.clone());

        let response = self.ctx.ai.extract(&request).await?;
        map_listing(&response, company, Utc::now())
    }
}

#[async_trait]
impl StageProcessor for ListingStage {
    fn stage(&self) -> Stage {
        Stage::Listing
    }

    async fn run_company(&self, company: &Company) -> UnitReport {
        let candidates = match self.discover(company).await {
            Ok(candidates) => candidates,
            Err(e) => return UnitReport::aborted(e),
        };
        info!(company = %company.name, found = candidates.len(), "job listings found");

        let observed: HashSet<_> = candidates.iter().map(|j| j.signature.clone()).collect();
        let mut report = UnitReport {
            observed: Some(observed),
            ..UnitReport::default()
        };

        let fresh = match self.ctx.lifecycle.filter_new(&company.name, candidates).await {
            Ok(fresh) => fresh,
            Err(e) => {
                report.error = Some(e);
                return report;
            }
        };

        for job in &fresh {
            match self.ctx.store.create_job(job).await {
                Ok(outcome) if outcome.is_created() => {
                    report.processed += 1;
                    report.completed += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(company = %company.name, job = %job.title, error = %e, "failed to save new job");
                    report.error = Some(e);
                    break;
                }
            }
        }

        info!(company = %company.name, new_jobs = report.completed, "saved new jobs");
        report
    }
}
