//! Export settings loaded from a JSON file.
//!
//! Every field is optional; missing ones take their defaults.
//!
//! ```json
//! {
//!   "top_group": "properties",
//!   "overwrite": true,
//!   "text_width": 32,
//!   "meta": { "domain": "CAD", "mesh": "none" }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::export::flat::DEFAULT_FLAT_GROUP;
use crate::export::tree::DEFAULT_TOP_GROUP;
use crate::export::{FlatExportOptions, FlatMeta, TreeExportOptions};
use crate::util::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    // Hierarchical export
    pub top_group: String,
    pub overwrite: bool,
    pub structure: bool,

    // Flat export
    pub flat_group: String,
    pub text_width: usize,
    pub meta: FlatMeta,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            top_group: DEFAULT_TOP_GROUP.to_string(),
            overwrite: true,
            structure: true,
            flat_group: DEFAULT_FLAT_GROUP.to_string(),
            text_width: 32,
            meta: FlatMeta::default(),
        }
    }
}

impl ExportConfig {
    /// Load settings from `path`. Unknown keys are rejected.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "loaded export config");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.top_group.is_empty() || self.top_group.contains('/') {
            return Err(Error::other(format!("invalid top_group {:?}", self.top_group)));
        }
        if self.flat_group.is_empty() || self.flat_group.contains('/') {
            return Err(Error::other(format!("invalid flat_group {:?}", self.flat_group)));
        }
        if self.text_width == 0 {
            return Err(Error::other("text_width must be positive"));
        }
        Ok(())
    }

    pub fn tree_options(&self) -> TreeExportOptions {
        TreeExportOptions {
            top_group: self.top_group.clone(),
            overwrite: self.overwrite,
            structure: self.structure,
        }
    }

    pub fn flat_options(&self) -> FlatExportOptions {
        FlatExportOptions {
            group: self.flat_group.clone(),
            text_width: self.text_width,
            meta: self.meta.clone(),
        }
    }
}
