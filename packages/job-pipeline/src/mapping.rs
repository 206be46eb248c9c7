//! Response mappers.
//!
//! Turn the JSON returned by the AI extractor into typed stage output.
//! Every shape problem is a [`PipelineError::Validation`]: the item is
//! counted failed and never retried.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::warn;
use url::Url;

use crate::error::{PipelineError, Result};
use crate::types::{
    Company, JobDetails, JobRecord, JobRequirements, JobTechnologies, Technology,
};

fn as_object<'a>(response: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    response
        .as_object()
        .ok_or_else(|| PipelineError::validation(format!("{what} response is not an object")))
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    match object.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
        Some(other) => Err(PipelineError::validation(format!(
            "invalid {field} value: {other}"
        ))),
        None => Err(PipelineError::validation(format!("missing {field} field"))),
    }
}

fn optional_str(object: &Map<String, Value>, field: &str) -> String {
    object
        .get(field)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn required_enum<T: DeserializeOwned>(object: &Map<String, Value>, field: &str) -> Result<T> {
    let raw = required_str(object, field)?;
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| PipelineError::validation(format!("invalid {field} value: {raw}")))
}

fn string_list(object: &Map<String, Value>, field: &str) -> Result<Vec<String>> {
    let Some(value) = object.get(field) else {
        return Err(PipelineError::validation(format!("missing {field} field")));
    };
    let Some(items) = value.as_array() else {
        return Err(PipelineError::validation(format!("invalid {field} value: {value}")));
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Some(s) = item.as_str() else {
            return Err(PipelineError::validation(format!(
                "invalid {field} item at index {index}: {item}"
            )));
        };
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    Ok(out)
}

// ============================================================================
// Stage 1
// ============================================================================

/// Map a listing response into candidate records for `company`.
///
/// Accepts `{"jobs": [...]}` or a bare array. Entries without a title or
/// URL are dropped. Relative URLs are resolved against the career page.
pub fn map_listing(response: &Value, company: &Company, now: DateTime<Utc>) -> Result<Vec<JobRecord>> {
    let entries = match response {
        Value::Array(items) => items,
        Value::Object(object) => match object.get("jobs") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(PipelineError::validation(
                    "listing response has no jobs array",
                ))
            }
        },
        _ => {
            return Err(PipelineError::validation(
                "listing response is not an object or array",
            ))
        }
    };

    let base = Url::parse(&company.career_url).ok();
    let mut jobs = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let title = entry.get("title").and_then(Value::as_str).map(str::trim);
        let url = entry.get("url").and_then(Value::as_str).map(str::trim);

        let (Some(title), Some(url)) = (title, url) else {
            warn!(company = %company.name, index, "dropping listing entry without title or url");
            continue;
        };
        if title.is_empty() || url.is_empty() {
            warn!(company = %company.name, index, "dropping listing entry without title or url");
            continue;
        }

        let absolute = resolve_url(base.as_ref(), url);
        jobs.push(JobRecord::discovered(title, absolute, company.name.clone(), now));
    }

    Ok(jobs)
}

fn resolve_url(base: Option<&Url>, raw: &str) -> String {
    if Url::parse(raw).is_ok() {
        return raw.to_string();
    }
    base.and_then(|b| b.join(raw).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| raw.to_string())
}

// ============================================================================
// Stages 2-4
// ============================================================================

pub fn map_details(response: &Value) -> Result<JobDetails> {
    let object = as_object(response, "details")?;
    Ok(JobDetails {
        location: required_enum(object, "location")?,
        work_mode: required_enum(object, "work_mode")?,
        employment_type: required_enum(object, "employment_type")?,
        experience_level: required_enum(object, "experience_level")?,
        job_function: required_enum(object, "job_function")?,
        province: optional_str(object, "province"),
        city: optional_str(object, "city"),
        description: required_str(object, "description")?.to_string(),
    })
}

pub fn map_requirements(response: &Value) -> Result<JobRequirements> {
    let object = as_object(response, "requirements")?;
    Ok(JobRequirements {
        responsibilities: string_list(object, "responsibilities")?,
        skill_must_have: string_list(object, "skill_must_have")?,
        skill_nice_to_have: string_list(object, "skill_nice_to_have")?,
        benefits: string_list(object, "benefits")?,
    })
}

pub fn map_technologies(response: &Value) -> Result<JobTechnologies> {
    let object = as_object(response, "technologies")?;

    let Some(Value::Array(entries)) = object.get("technologies") else {
        return Err(PipelineError::validation("missing technologies array"));
    };

    let mut technologies = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            return Err(PipelineError::validation(format!(
                "invalid technology at index {index}: {entry}"
            )));
        };
        technologies.push(Technology {
            name: required_str(entry, "name")?.to_string(),
            category: optional_str(entry, "category"),
            required: entry.get("required").and_then(Value::as_bool).unwrap_or(false),
        });
    }

    Ok(JobTechnologies {
        technologies,
        main_technologies: string_list(object, "main_technologies")?,
    })
}

/// Stage 4 prompt input: the skills found by stage 3.
pub fn requirements_json(requirements: &JobRequirements) -> Result<String> {
    let document = json!({
        "requirements": {
            "must_have": requirements.skill_must_have,
            "nice_to_have": requirements.skill_nice_to_have,
        }
    });
    Ok(serde_json::to_string_pretty(&document)?)
}
