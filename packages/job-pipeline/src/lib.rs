//! Staged job posting pipeline.
//!
//! Discovers job postings on company career pages, enriches them in three
//! further stages, retires postings that disappear, and keeps per-company
//! and pipeline-wide daily metrics.
//!
//! # Stages
//!
//! 1. **Listing**: fetch the career page, extract postings, store the new ones
//! 2. **Details**: location, work mode, seniority and the like
//! 3. **Requirements**: responsibilities, skills, benefits
//! 4. **Technologies**: derived from the requirements, no page fetch
//!
//! After the enabled stages, a settlement pass summarizes every company and
//! recomputes the day's aggregate.
//!
//! # Usage
//!
//! ```rust,ignore
//! use job_pipeline::{Pipeline, PipelineConfig, PipelineDeps, StaticRegistry, MemoryStore};
//! use std::sync::Arc;
//!
//! let deps = PipelineDeps::builder()
//!     .registry(Arc::new(StaticRegistry::from_json(&companies_json)?))
//!     .web(Arc::new(my_web_extractor))
//!     .ai(Arc::new(my_ai_extractor))
//!     .store(Arc::new(MemoryStore::new()))
//!     .build();
//!
//! let pipeline = Pipeline::new(PipelineConfig::from_env()?, deps)?;
//! let report = pipeline.run().await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator interfaces (web, AI, registry, store)
//! - [`types`] - Companies, job records, stage outcomes, metrics documents
//! - [`stages`] - Per-stage processors
//! - [`stores`] - Storage implementations (MemoryStore, PostgresStore)
//! - [`testing`] - Mocks for tests

pub mod config;
pub mod driver;
pub mod error;
pub mod flow;
pub mod lifecycle;
pub mod mapping;
pub mod metrics;
pub mod retry;
pub mod settlement;
pub mod signature;
pub mod stages;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

pub use config::{PipelineConfig, RetryPolicy, StageConfig};
pub use driver::{Pipeline, PipelineDeps, RunReport};
pub use error::{ErrorKind, PipelineError, Result};
pub use flow::{CompanyOutcome, StageFlow, StageReport};
pub use lifecycle::{LifecycleManager, SweepReport};
pub use metrics::MetricsRecorder;
pub use settlement::{JobStats, Settlement, SettlementReport};
pub use signature::{canonicalize_url, signature_of, JobSignature};
pub use stores::MemoryStore;
#[cfg(feature = "postgres")]
pub use stores::PostgresStore;
pub use traits::ai::{AiExtractor, AiRequest};
pub use traits::registry::{CompanyRegistry, StaticRegistry};
pub use traits::store::{CreateOutcome, JobStore, MetricsStore, PipelineStore};
pub use traits::web::WebExtractor;
pub use types::{
    Company, CompanyDailyMetrics, CompanyStatus, CompanySummary, DailyAggregateMetrics,
    EmploymentType, ExperienceLevel, JobDetails, JobFunction, JobRecord, JobRequirements,
    JobTechnologies, Location, ParserStrategy, SelectorConfig, Stage, StageAggregate,
    StageCompletion, StageOutcome, StageStatus, Technology, WebParserConfig, WorkMode,
};

/// Install a `tracing` subscriber reading `RUST_LOG`.
///
/// For host binaries and tests; a second call is a no-op.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,job_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}
