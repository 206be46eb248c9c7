//! Stage 2: location, work mode, seniority and description of each job.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{JobEnricher, StageContext};
use crate::error::Result;
use crate::mapping::map_details;
use crate::types::{Company, JobRecord, Stage};

pub struct DetailsEnricher {
    ctx: Arc<StageContext>,
}

impl DetailsEnricher {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobEnricher for DetailsEnricher {
    fn stage(&self) -> Stage {
        Stage::Details
    }

    async fn enrich(&self, company: &Company, job: &JobRecord) -> Result<JobRecord> {
        let content = self
            .ctx
            .fetch_page(
                &job.url,
                &company.web_parser.selectors.job_card,
                &company.web_parser.strategy,
            )
            .await?;

        let request = self
            .ctx
            .request_for(Stage::Details, job.title.clone())?
            .with_variable("html_content", content);

        let response = self.ctx.ai.extract(&request).await?;
        job.with_details(map_details(&response)?, Utc::now())
    }
}
