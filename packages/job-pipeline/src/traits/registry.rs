//! Company registry trait.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::types::Company;

/// Read-only source of the companies to scrape.
#[async_trait]
pub trait CompanyRegistry: Send + Sync {
    async fn list_companies(&self) -> Result<Vec<Company>>;
}

/// Registry over a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    companies: Vec<Company>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryDocument {
    Wrapped { companies: Vec<Company> },
    Bare(Vec<Company>),
}

impl StaticRegistry {
    pub fn new(companies: Vec<Company>) -> Self {
        Self { companies }
    }

    /// Parse `{"companies": [...]}` or a bare array.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: RegistryDocument = serde_json::from_str(json)
            .map_err(|e| PipelineError::Config(format!("invalid company registry: {}", e)))?;
        let companies = match document {
            RegistryDocument::Wrapped { companies } => companies,
            RegistryDocument::Bare(companies) => companies,
        };
        Ok(Self::new(companies))
    }

    pub fn with_company(mut self, company: Company) -> Self {
        self.companies.push(company);
        self
    }
}

#[async_trait]
impl CompanyRegistry for StaticRegistry {
    async fn list_companies(&self) -> Result<Vec<Company>> {
        Ok(self.companies.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_json_shapes() {
        let wrapped = StaticRegistry::from_json(
            r#"{"companies": [{"name": "Acme", "career_url": "https://acme.test/careers"}]}"#,
        )
        .unwrap();
        assert_eq!(wrapped.list_companies().await.unwrap().len(), 1);

        let bare = StaticRegistry::from_json(
            r#"[{"name": "Acme", "career_url": "https://acme.test/careers", "enabled": false}]"#,
        )
        .unwrap();
        let companies = bare.list_companies().await.unwrap();
        assert!(!companies[0].enabled);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            StaticRegistry::from_json("{\"companies\": 3}"),
            Err(PipelineError::Config(_))
        ));
    }
}
