//! Canned pages and AI responses.

use serde_json::{json, Value};

pub fn career_url(company: &str) -> String {
    format!("https://{}.test/careers", company.to_lowercase())
}

pub fn job_url(company: &str, slug: &str) -> String {
    format!("https://{}.test/jobs/{}", company.to_lowercase(), slug)
}

/// Career page body. Also the needle listing responses are keyed on.
pub fn career_page(company: &str) -> String {
    format!("<main>[careers {}]</main>", company)
}

/// Job page body. Also the needle stage 2/3 responses are keyed on.
pub fn job_page(url: &str) -> String {
    format!("<article>[job {}]</article>", url)
}

pub fn job_needle(url: &str) -> String {
    format!("[job {}]", url)
}

pub fn career_needle(company: &str) -> String {
    format!("[careers {}]", company)
}

pub fn listing_response(company: &str, slugs: &[&str]) -> Value {
    let jobs: Vec<Value> = slugs
        .iter()
        .map(|slug| {
            json!({
                "title": format!("{} Engineer", slug),
                "url": job_url(company, slug),
            })
        })
        .collect();
    json!({ "jobs": jobs })
}

pub fn details_response() -> Value {
    json!({
        "location": "Costa Rica",
        "work_mode": "Hybrid",
        "employment_type": "Full-time",
        "experience_level": "Senior",
        "job_function": "Technology & Engineering",
        "province": "San José",
        "city": "Escazú",
        "description": "Build and run backend services."
    })
}

/// Missing every required field but location.
pub fn invalid_details_response() -> Value {
    json!({ "location": "Costa Rica" })
}

pub fn requirements_response() -> Value {
    json!({
        "responsibilities": ["Own services end to end"],
        "skill_must_have": ["Rust", "PostgreSQL"],
        "skill_nice_to_have": ["Kubernetes"],
        "benefits": ["Remote Fridays"]
    })
}

pub fn technologies_response() -> Value {
    json!({
        "technologies": [
            {"name": "Rust", "category": "Language", "required": true},
            {"name": "PostgreSQL", "category": "Database", "required": true},
            {"name": "Kubernetes", "category": "Infrastructure", "required": false}
        ],
        "main_technologies": ["Rust", "PostgreSQL"]
    })
}
