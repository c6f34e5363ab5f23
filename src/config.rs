//! Import configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Settings of a batch extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractorConfig {
    /// Allowed difference between declared and computed amounts, in minor units
    pub tolerance_minor_units: i64,
    /// Extract documents on the rayon thread pool
    pub parallel: bool,
    /// Combine tax treatment notices with the income posting they belong to
    pub merge_tax_documents: bool,
    /// Currency assumed when a document omits it
    pub default_currency: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            tolerance_minor_units: 1,
            parallel: false,
            merge_tax_documents: true,
            default_currency: "EUR".to_string(),
        }
    }
}

impl ExtractorConfig {
    /// Parse from JSON; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("Failed to parse extractor configuration")?;
        if config.tolerance_minor_units < 0 {
            anyhow::bail!(
                "toleranceMinorUnits must not be negative, got {}",
                config.tolerance_minor_units
            );
        }
        Ok(config)
    }
}
