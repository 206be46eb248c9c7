//! Stage 4: technologies named by the skills from stage 3.
//!
//! Works from stored data only; no page fetch.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{JobEnricher, StageContext};
use crate::error::{PipelineError, Result};
use crate::mapping::{map_technologies, requirements_json};
use crate::types::{Company, JobRecord, Stage};

pub struct TechnologiesEnricher {
    ctx: Arc<StageContext>,
}

impl TechnologiesEnricher {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobEnricher for TechnologiesEnricher {
    fn stage(&self) -> Stage {
        Stage::Technologies
    }

    async fn enrich(&self, _company: &Company, job: &JobRecord) -> Result<JobRecord> {
        let requirements = job.requirements.as_ref().ok_or_else(|| {
            PipelineError::validation(format!("job {} has no requirements data", job.title))
        })?;

        let request = self
            .ctx
            .request_for(Stage::Technologies, job.title.clone())?
            .with_variable("requirements_json", requirements_json(requirements)?);

        let response = self.ctx.ai.extract(&request).await?;
        job.with_technologies(map_technologies(&response)?, Utc::now())
    }
}
