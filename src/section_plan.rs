use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One planned visual section as returned by the LLM: a stretch of the
/// narration timeline paired with a stock-footage search query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionPlan {
    pub section_text: String,
    pub search_query: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionPlanList {
    pub items: Vec<SectionPlan>,
}

impl SectionPlanList {
    pub fn from_json(text: &str) -> Result<Self> {
        let items: Vec<SectionPlan> =
            serde_json::from_str(text).context("Failed to parse section plan JSON")?;
        Ok(Self { items })
    }
}
