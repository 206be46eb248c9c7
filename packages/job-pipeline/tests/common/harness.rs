//! In-memory test harness.
//!
//! Wires a [`Pipeline`] to mock web and AI extractors and a memory store
//! wrapped in a [`FlakyStore`] so tests can inject datastore failures.

use job_pipeline::testing::{FlakyStore, MockAiExtractor, MockWebExtractor};
use job_pipeline::{
    Company, JobRecord, MemoryStore, Pipeline, PipelineConfig, PipelineDeps, RetryPolicy,
    RunReport, StaticRegistry,
};
use std::sync::{Arc, Mutex};
use test_context::AsyncTestContext;

use super::fixtures::*;

pub struct TestHarness {
    pub web: Arc<MockWebExtractor>,
    pub ai: Arc<MockAiExtractor>,
    pub store: Arc<FlakyStore<MemoryStore>>,
    companies: Mutex<Vec<Company>>,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
    }

    async fn teardown(self) {}
}

impl TestHarness {
    pub fn new() -> Self {
        job_pipeline::init_tracing();

        let ai = MockAiExtractor::new();
        // Stage 4 input always carries the skill lists
        ai.set_response("job_technologies", "must_have", technologies_response());

        Self {
            web: Arc::new(MockWebExtractor::new()),
            ai: Arc::new(ai),
            store: Arc::new(FlakyStore::new(MemoryStore::new())),
            companies: Mutex::new(Vec::new()),
        }
    }

    /// Register a company whose career page lists `slugs`, with valid
    /// responses for every stage of every posting.
    pub fn add_company(&self, name: &str, slugs: &[&str]) {
        self.add_company_config(Company::new(name, career_url(name)), slugs);
    }

    pub fn add_company_config(&self, company: Company, slugs: &[&str]) {
        self.web.set_page(company.career_url.clone(), career_page(&company.name));
        self.set_listing(&company.name, slugs);
        self.companies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(company);
    }

    /// Replace what a company's career page lists from now on.
    pub fn set_listing(&self, company: &str, slugs: &[&str]) {
        self.ai.set_response(
            "job_listing",
            career_needle(company),
            listing_response(company, slugs),
        );
        for slug in slugs {
            let url = job_url(company, slug);
            self.web.set_page(url.clone(), job_page(&url));
            self.ai
                .set_response("job_details", job_needle(&url), details_response());
            self.ai
                .set_response("job_requirements", job_needle(&url), requirements_response());
        }
    }

    pub fn config() -> PipelineConfig {
        PipelineConfig::default().with_retry(RetryPolicy::none())
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with(Self::config())
    }

    pub fn pipeline_with(&self, config: PipelineConfig) -> Pipeline {
        let companies = self
            .companies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let deps = PipelineDeps::builder()
            .registry(Arc::new(StaticRegistry::new(companies)))
            .web(self.web.clone())
            .ai(self.ai.clone())
            .store(self.store.clone())
            .build();

        Pipeline::new(config, deps).expect("valid pipeline config")
    }

    pub async fn run(&self) -> RunReport {
        self.pipeline().run().await.expect("pipeline run")
    }

    pub fn memory(&self) -> &MemoryStore {
        self.store.inner()
    }

    pub fn job(&self, company: &str, slug: &str) -> JobRecord {
        let url = job_url(company, slug);
        self.memory()
            .all_jobs()
            .into_iter()
            .find(|j| j.url == url)
            .unwrap_or_else(|| panic!("no job stored for {url}"))
    }
}
