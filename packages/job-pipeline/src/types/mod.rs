//! Domain types shared across the pipeline.

pub mod company;
pub mod job;
pub mod metrics;
pub mod stage;

pub use company::{Company, ParserStrategy, SelectorConfig, WebParserConfig};
pub use job::{
    EmploymentType, ExperienceLevel, JobDetails, JobFunction, JobRecord, JobRequirements,
    JobTechnologies, Location, StageCompletion, Technology, WorkMode,
};
pub use metrics::{
    CompanyDailyMetrics, CompanyStatus, CompanySummary, DailyAggregateMetrics, StageAggregate,
    StageOutcome, StageStatus,
};
pub use stage::Stage;
