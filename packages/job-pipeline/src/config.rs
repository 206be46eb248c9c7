//! Pipeline configuration.
//!
//! Built in code with the `with_*` setters, deserialized from a document, or
//! loaded from the environment with [`PipelineConfig::from_env`].

use anyhow::{bail, Context};
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::types::Stage;

/// Capped exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_factor.powi(exponent);
        let capped = millis.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Per-stage settings. Template references are opaque to the pipeline and
/// passed through to the AI extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub prompt_template: String,
    #[serde(default)]
    pub system_message: Option<String>,
    #[serde(default)]
    pub response_schema: Option<String>,
}

fn default_true() -> bool {
    true
}

impl StageConfig {
    pub fn new(prompt_template: impl Into<String>) -> Self {
        Self {
            enabled: true,
            prompt_template: prompt_template.into(),
            system_message: None,
            response_schema: None,
        }
    }

    /// Default template reference for a stage.
    pub fn default_for(stage: Stage) -> Self {
        let template = match stage {
            Stage::Listing => "job_listing",
            Stage::Details => "job_details",
            Stage::Requirements => "job_requirements",
            Stage::Technologies => "job_technologies",
        };
        Self::new(template).with_response_schema(format!("{template}_schema"))
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    pub fn with_response_schema(mut self, schema: impl Into<String>) -> Self {
        self.response_schema = Some(schema.into());
        self
    }
}

fn default_stages() -> BTreeMap<Stage, StageConfig> {
    Stage::ALL
        .into_iter()
        .map(|stage| (stage, StageConfig::default_for(stage)))
        .collect()
}

/// Configuration for one pipeline run.
///
/// Stages missing from `stages` are treated as disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Company units running at once, per stage.
    pub concurrency: usize,
    pub stages: BTreeMap<Stage, StageConfig>,
    /// Retry policy for metrics writes.
    pub retry: RetryPolicy,
    /// Offset used to decide which calendar day a run belongs to.
    pub utc_offset_hours: i32,
    /// Skip the remaining stages when every company unit of a stage failed.
    pub halt_on_total_stage_failure: bool,
    /// Flip inactive jobs back to active when they reappear on a listing.
    pub reactivate_reappeared: bool,
    /// Before stage 1, delete active jobs that have not finished the last
    /// enabled stage so they are rediscovered from scratch.
    pub remove_incomplete_jobs: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            stages: default_stages(),
            retry: RetryPolicy::default(),
            // America/Costa_Rica, no DST
            utc_offset_hours: -6,
            halt_on_total_stage_failure: true,
            reactivate_reappeared: false,
            remove_incomplete_jobs: false,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables on top of the defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("PIPELINE_CONCURRENCY") {
            config.concurrency = raw
                .trim()
                .parse()
                .context("PIPELINE_CONCURRENCY must be a positive number")?;
        }

        if let Some(raw) = lookup("PIPELINE_STAGES") {
            let stages = parse_stage_list(&raw).context("PIPELINE_STAGES must look like 1,2,4")?;
            config = config.with_only_stages(&stages);
        }

        if let Some(raw) = lookup("PIPELINE_UTC_OFFSET_HOURS") {
            config.utc_offset_hours = raw
                .trim()
                .parse()
                .context("PIPELINE_UTC_OFFSET_HOURS must be a whole number of hours")?;
        }

        if let Some(raw) = lookup("PIPELINE_METRICS_MAX_ATTEMPTS") {
            config.retry.max_attempts = raw
                .trim()
                .parse()
                .context("PIPELINE_METRICS_MAX_ATTEMPTS must be a positive number")?;
        }

        if let Some(raw) = lookup("PIPELINE_HALT_ON_STAGE_FAILURE") {
            config.halt_on_total_stage_failure = parse_flag(&raw)
                .context("PIPELINE_HALT_ON_STAGE_FAILURE must be true or false")?;
        }

        if let Some(raw) = lookup("PIPELINE_REACTIVATE_REAPPEARED") {
            config.reactivate_reappeared = parse_flag(&raw)
                .context("PIPELINE_REACTIVATE_REAPPEARED must be true or false")?;
        }

        if let Some(raw) = lookup("PIPELINE_REMOVE_INCOMPLETE_JOBS") {
            config.remove_incomplete_jobs = parse_flag(&raw)
                .context("PIPELINE_REMOVE_INCOMPLETE_JOBS must be true or false")?;
        }

        config.validate().context("invalid pipeline configuration")?;
        Ok(config)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_stage(mut self, stage: Stage, config: StageConfig) -> Self {
        self.stages.insert(stage, config);
        self
    }

    /// Enable exactly the given stages.
    pub fn with_only_stages(mut self, stages: &[Stage]) -> Self {
        for stage in Stage::ALL {
            let entry = self
                .stages
                .entry(stage)
                .or_insert_with(|| StageConfig::default_for(stage));
            entry.enabled = stages.contains(&stage);
        }
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_utc_offset_hours(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    pub fn with_halt_on_total_stage_failure(mut self, halt: bool) -> Self {
        self.halt_on_total_stage_failure = halt;
        self
    }

    pub fn with_reactivate_reappeared(mut self, reactivate: bool) -> Self {
        self.reactivate_reappeared = reactivate;
        self
    }

    pub fn with_remove_incomplete_jobs(mut self, remove: bool) -> Self {
        self.remove_incomplete_jobs = remove;
        self
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageConfig> {
        self.stages.get(&stage)
    }

    pub fn is_enabled(&self, stage: Stage) -> bool {
        self.stage(stage).map(|s| s.enabled).unwrap_or(false)
    }

    /// Enabled stages in execution order.
    pub fn enabled_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| self.is_enabled(*stage))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(PipelineError::Config("concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(PipelineError::Config("retry.backoff_factor must be >= 1.0".into()));
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(PipelineError::Config(format!(
                "utc_offset_hours out of range: {}",
                self.utc_offset_hours
            )));
        }
        for stage in self.enabled_stages() {
            let blank = self
                .stage(stage)
                .map(|s| s.prompt_template.trim().is_empty())
                .unwrap_or(true);
            if blank {
                return Err(PipelineError::Config(format!(
                    "{} is enabled but has no prompt template",
                    stage
                )));
            }
        }
        Ok(())
    }

    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Local calendar day of an instant.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.timezone()).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }
}

fn parse_stage_list(raw: &str) -> anyhow::Result<Vec<Stage>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| Stage::from_tag(part).with_context(|| format!("unknown stage: {part}")))
        .collect()
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("not a boolean: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.enabled_stages(), Stage::ALL.to_vec());
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.halt_on_total_stage_failure);
        assert!(!config.reactivate_reappeared);
        assert!(!config.remove_incomplete_jobs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("PIPELINE_CONCURRENCY", "5"),
            ("PIPELINE_STAGES", "1, 2,stage_4"),
            ("PIPELINE_UTC_OFFSET_HOURS", "0"),
            ("PIPELINE_METRICS_MAX_ATTEMPTS", "1"),
            ("PIPELINE_REACTIVATE_REAPPEARED", "yes"),
            ("PIPELINE_REMOVE_INCOMPLETE_JOBS", "on"),
        ]))
        .unwrap();

        assert_eq!(config.concurrency, 5);
        assert_eq!(
            config.enabled_stages(),
            vec![Stage::Listing, Stage::Details, Stage::Technologies]
        );
        assert_eq!(config.utc_offset_hours, 0);
        assert_eq!(config.retry.max_attempts, 1);
        assert!(config.reactivate_reappeared);
        assert!(config.remove_incomplete_jobs);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(PipelineConfig::from_lookup(lookup(&[("PIPELINE_CONCURRENCY", "many")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("PIPELINE_CONCURRENCY", "0")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("PIPELINE_STAGES", "1,7")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("PIPELINE_UTC_OFFSET_HOURS", "40")])).is_err());
    }

    #[test]
    fn test_enabled_stage_needs_template() {
        let config = PipelineConfig::default().with_stage(Stage::Details, StageConfig::new("  "));
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let mut disabled = StageConfig::new("");
        disabled.enabled = false;
        let config = PipelineConfig::default().with_stage(Stage::Details, disabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(10), Duration::from_secs(30));
    }

    #[test]
    fn test_local_date_uses_offset() {
        let config = PipelineConfig::default();
        // 03:00 UTC is still the previous day at UTC-6
        let at = Utc.with_ymd_and_hms(2024, 3, 2, 3, 0, 0).unwrap();
        assert_eq!(config.local_date(at), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let utc = config.with_utc_offset_hours(0);
        assert_eq!(utc.local_date(at), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }

    #[test]
    fn test_deserialize_partial_document() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"concurrency": 2, "stages": {"stage_1": {"prompt_template": "listing"}}}"#,
        )
        .unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.enabled_stages(), vec![Stage::Listing]);
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
