//! Stage 3: responsibilities, skills and benefits of each job.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{JobEnricher, StageContext};
use crate::error::Result;
use crate::mapping::map_requirements;
use crate::types::{Company, JobRecord, Stage};

pub struct RequirementsEnricher {
    ctx: Arc<StageContext>,
}

impl RequirementsEnricher {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobEnricher for RequirementsEnricher {
    fn stage(&self) -> Stage {
        Stage::Requirements
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
            .request_for(Stage::Requirements, job.title.clone())?
            .with_variable("html_content", content);

        let response = self.ctx.ai.extract(&request).await?;
        job.with_requirements(map_requirements(&response)?, Utc::now())
    }
}
