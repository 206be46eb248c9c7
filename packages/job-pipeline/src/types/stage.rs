use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four enrichment passes, in execution order.
///
/// Settlement (metrics, "stage 5") is not a `Stage`: it produces no
/// per-company outcome of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "stage_1")]
    Listing,
    #[serde(rename = "stage_2")]
    Details,
    #[serde(rename = "stage_3")]
    Requirements,
    #[serde(rename = "stage_4")]
    Technologies,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Listing,
        Stage::Details,
        Stage::Requirements,
        Stage::Technologies,
    ];

    pub fn number(&self) -> u8 {
        match self {
            Stage::Listing => 1,
            Stage::Details => 2,
            Stage::Requirements => 3,
            Stage::Technologies => 4,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Stage::ALL.into_iter().find(|s| s.number() == number)
    }

    /// Accepts both `"stage_2"` and `"2"`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let trimmed = tag.trim();
        let digits = trimmed.strip_prefix("stage_").unwrap_or(trimmed);
        digits.parse::<u8>().ok().and_then(Self::from_number)
    }

    pub fn tag(&self) -> String {
        format!("stage_{}", self.number())
    }

    /// The stage whose output this stage consumes.
    pub fn previous(&self) -> Option<Stage> {
        Stage::from_number(self.number() - 1)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Stage::Listing => "job listing extraction",
            Stage::Details => "job details extraction",
            Stage::Requirements => "skills and responsibilities extraction",
            Stage::Technologies => "technologies extraction",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage_{}", self.number())
    }
}
