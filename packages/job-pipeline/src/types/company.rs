use serde::{Deserialize, Serialize};
use std::fmt;

/// Parser strategy tag passed through to the web extractor.
///
/// The pipeline never interprets it; unknown tags are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParserStrategy {
    #[default]
    Default,
    Greenhouse,
    Angular,
    Other(String),
}

impl From<String> for ParserStrategy {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "" | "default" => ParserStrategy::Default,
            "greenhouse" => ParserStrategy::Greenhouse,
            "angular" => ParserStrategy::Angular,
            _ => ParserStrategy::Other(value),
        }
    }
}

impl From<ParserStrategy> for String {
    fn from(value: ParserStrategy) -> Self {
        value.as_str().to_string()
    }
}

impl ParserStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            ParserStrategy::Default => "default",
            ParserStrategy::Greenhouse => "greenhouse",
            ParserStrategy::Angular => "angular",
            ParserStrategy::Other(tag) => tag,
        }
    }
}

impl fmt::Display for ParserStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CSS selectors for the career board and for individual postings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default)]
    pub job_board: Vec<String>,
    #[serde(default)]
    pub job_card: Vec<String>,
}

/// How a company's pages are fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebParserConfig {
    #[serde(default, rename = "type")]
    pub strategy: ParserStrategy,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

/// A company whose career page is scraped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
    pub career_url: String,
    #[serde(default)]
    pub web_parser: WebParserConfig,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Company {
    pub fn new(name: impl Into<String>, career_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            career_url: career_url.into(),
            web_parser: WebParserConfig::default(),
            enabled: true,
        }
    }

    pub fn with_strategy(mut self, strategy: ParserStrategy) -> Self {
        self.web_parser.strategy = strategy;
        self
    }

    pub fn with_job_board_selector(mut self, selector: impl Into<String>) -> Self {
        self.web_parser.selectors.job_board.push(selector.into());
        self
    }

    pub fn with_job_card_selector(mut self, selector: impl Into<String>) -> Self {
        self.web_parser.selectors.job_card.push(selector.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Name and career URL are required; the URL must be absolute http(s).
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("company name is required".to_string());
        }
        let url = url::Url::parse(&self.career_url)
            .map_err(|e| format!("invalid career_url for {}: {}", self.name, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "career_url for {} must be http(s), got {}",
                self.name,
                url.scheme()
            ));
        }
        Ok(())
    }
}
