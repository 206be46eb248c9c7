use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use super::stage::Stage;
use crate::error::{PipelineError, Result};
use crate::signature::JobSignature;

// ============================================================================
// Stage 2 vocabulary
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    #[serde(rename = "Costa Rica")]
    CostaRica,
    #[serde(rename = "LATAM")]
    Latam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkMode {
    Remote,
    Hybrid,
    Onsite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmploymentType {
    #[serde(rename = "Full-time")]
    FullTime,
    #[serde(rename = "Part-time")]
    PartTime,
    Contract,
    Freelance,
    Temporary,
    Internship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExperienceLevel {
    #[serde(rename = "Entry-level")]
    EntryLevel,
    Junior,
    #[serde(rename = "Mid-level")]
    MidLevel,
    Senior,
    Lead,
    Principal,
    Executive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobFunction {
    #[serde(rename = "Technology & Engineering")]
    TechnologyEngineering,
    #[serde(rename = "Sales & Business Development")]
    SalesBusinessDevelopment,
    #[serde(rename = "Marketing & Communications")]
    MarketingCommunications,
    #[serde(rename = "Operations & Logistics")]
    OperationsLogistics,
    #[serde(rename = "Finance & Accounting")]
    FinanceAccounting,
    #[serde(rename = "Human Resources")]
    HumanResources,
    #[serde(rename = "Customer Success & Support")]
    CustomerSuccessSupport,
    #[serde(rename = "Product Management")]
    ProductManagement,
    #[serde(rename = "Data & Analytics")]
    DataAnalytics,
    #[serde(rename = "Healthcare & Medical")]
    HealthcareMedical,
    #[serde(rename = "Legal & Compliance")]
    LegalCompliance,
    #[serde(rename = "Design & Creative")]
    DesignCreative,
    #[serde(rename = "Administrative & Office")]
    AdministrativeOffice,
    #[serde(rename = "Consulting & Strategy")]
    ConsultingStrategy,
    #[serde(rename = "General Management")]
    GeneralManagement,
    Other,
}

// ============================================================================
// Stage output blocks
// ============================================================================

/// Stage 2 output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetails {
    pub location: Location,
    pub work_mode: WorkMode,
    pub employment_type: EmploymentType,
    pub experience_level: ExperienceLevel,
    pub job_function: JobFunction,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    pub description: String,
}

/// Stage 3 output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequirements {
    pub responsibilities: Vec<String>,
    pub skill_must_have: Vec<String>,
    pub skill_nice_to_have: Vec<String>,
    pub benefits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub required: bool,
}

/// Stage 4 output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTechnologies {
    pub technologies: Vec<Technology>,
    pub main_technologies: Vec<String>,
}

// ============================================================================
// Completion flags
// ============================================================================

/// Monotonic per-stage completion flags, stored flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCompletion {
    pub stage_1_completed: bool,
    pub stage_2_completed: bool,
    pub stage_3_completed: bool,
    pub stage_4_completed: bool,
}

impl StageCompletion {
    /// Flags of a freshly discovered job: stage 1 only.
    pub fn discovered() -> Self {
        Self {
            stage_1_completed: true,
            stage_2_completed: false,
            stage_3_completed: false,
            stage_4_completed: false,
        }
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        match stage {
            Stage::Listing => self.stage_1_completed,
            Stage::Details => self.stage_2_completed,
            Stage::Requirements => self.stage_3_completed,
            Stage::Technologies => self.stage_4_completed,
        }
    }

    /// Set a stage's flag. Refuses when the previous stage is incomplete.
    /// There is no way to clear a flag.
    fn mark(&mut self, stage: Stage) -> Result<()> {
        if let Some(previous) = stage.previous() {
            if !self.is_completed(previous) {
                return Err(PipelineError::validation(format!(
                    "cannot complete {} before {}",
                    stage, previous
                )));
            }
        }
        match stage {
            Stage::Listing => self.stage_1_completed = true,
            Stage::Details => self.stage_2_completed = true,
            Stage::Requirements => self.stage_3_completed = true,
            Stage::Technologies => self.stage_4_completed = true,
        }
        Ok(())
    }

    /// Flags set in either value.
    pub fn union(&self, other: &StageCompletion) -> StageCompletion {
        StageCompletion {
            stage_1_completed: self.stage_1_completed || other.stage_1_completed,
            stage_2_completed: self.stage_2_completed || other.stage_2_completed,
            stage_3_completed: self.stage_3_completed || other.stage_3_completed,
            stage_4_completed: self.stage_4_completed || other.stage_4_completed,
        }
    }

    /// Highest completed stage, if any.
    pub fn latest(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .rev()
            .find(|stage| self.is_completed(*stage))
    }
}

// ============================================================================
// Job Record
// ============================================================================

/// One job posting, growing through the pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct JobRecord {
    // Stage 1 facts
    pub signature: JobSignature,
    #[builder(setter(into))]
    pub title: String,
    #[builder(setter(into))]
    pub url: String,
    #[builder(setter(into))]
    pub company: String,

    // Enrichment blocks
    #[builder(default, setter(strip_option))]
    pub details: Option<JobDetails>,
    #[builder(default, setter(strip_option))]
    pub requirements: Option<JobRequirements>,
    #[builder(default, setter(strip_option))]
    pub technologies: Option<JobTechnologies>,

    // State
    #[serde(flatten)]
    #[builder(default = StageCompletion::discovered())]
    pub completion: StageCompletion,
    #[builder(default = true)]
    pub active: bool,
    #[builder(default, setter(strip_option))]
    pub deactivated_at: Option<DateTime<Utc>>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A job found on a career page for the first time.
    pub fn discovered(
        title: impl Into<String>,
        url: impl Into<String>,
        company: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let url = url.into();
        JobRecord::builder()
            .signature(JobSignature::of(&url))
            .title(title)
            .url(url)
            .company(company)
            .created_at(now)
            .updated_at(now)
            .build()
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        self.completion.is_completed(stage)
    }

    /// Active, previous stage done, this stage not yet done.
    pub fn is_pending_for(&self, stage: Stage) -> bool {
        let previous_done = stage
            .previous()
            .map(|previous| self.is_completed(previous))
            .unwrap_or(true);
        self.active && previous_done && !self.is_completed(stage)
    }

    /// Copy of this record with stage 2 output attached.
    pub fn with_details(&self, details: JobDetails, now: DateTime<Utc>) -> Result<Self> {
        let mut next = self.clone();
        next.completion.mark(Stage::Details)?;
        next.details = Some(details);
        next.updated_at = now;
        Ok(next)
    }

    /// Copy of this record with stage 3 output attached.
    pub fn with_requirements(&self, requirements: JobRequirements, now: DateTime<Utc>) -> Result<Self> {
        let mut next = self.clone();
        next.completion.mark(Stage::Requirements)?;
        next.requirements = Some(requirements);
        next.updated_at = now;
        Ok(next)
    }

    /// Copy of this record with stage 4 output attached. Requires stage 3 output.
    pub fn with_technologies(&self, technologies: JobTechnologies, now: DateTime<Utc>) -> Result<Self> {
        if self.requirements.is_none() {
            return Err(PipelineError::validation(format!(
                "job {} has no requirements data from {}",
                self.title,
                Stage::Requirements
            )));
        }
        let mut next = self.clone();
        next.completion.mark(Stage::Technologies)?;
        next.technologies = Some(technologies);
        next.updated_at = now;
        Ok(next)
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.deactivated_at = Some(now);
        self.updated_at = now;
    }

    pub fn reactivate(&mut self, now: DateTime<Utc>) {
        self.active = true;
        self.deactivated_at = None;
        self.updated_at = now;
    }
}
