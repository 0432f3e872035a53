//! Configuration generation from a TOML layout
//!
//! A layout lists the blocks to generate with their settings:
//!
//! ```toml
//! [job]
//! title = "tW"
//! Lumi = 139.0
//!
//! [fit]
//! title = "tW"
//! FitBlind = true
//!
//! [[region]]
//! title = "reg1j1b"
//! Variable = "bdt_response,12,0.2,0.8"
//! Binning = [0.2, 0.4, 0.8]
//! ```
//!
//! TOML strings become quoted values, numbers and arrays are written bare,
//! booleans become `TRUE`/`FALSE`. When the Job block does not set
//! `SummaryPlotRegions`, it is filled with every generated region.

use crate::block::{Block, BlockKind, Field};
use crate::document::{Document, SUMMARY_PLOT_REGIONS};
use crate::error::TemplateError;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

/// Settings of one generated block
#[derive(Debug, Clone, Deserialize)]
pub struct BlockLayout {
    /// Block title
    pub title: String,
    /// Remaining keys, in file order
    #[serde(flatten)]
    pub settings: IndexMap<String, toml::Value>,
}

/// Complete generation layout
#[derive(Debug, Clone, Deserialize)]
pub struct Layout {
    /// Job block
    pub job: BlockLayout,
    /// Fit block
    #[serde(default)]
    pub fit: Option<BlockLayout>,
    /// Region blocks
    #[serde(default, rename = "region")]
    pub regions: Vec<BlockLayout>,
    /// Sample blocks
    #[serde(default, rename = "sample")]
    pub samples: Vec<BlockLayout>,
    /// NormFactor blocks
    #[serde(default, rename = "norm_factor")]
    pub norm_factors: Vec<BlockLayout>,
    /// Systematic blocks
    #[serde(default, rename = "systematic")]
    pub systematics: Vec<BlockLayout>,
}

impl Layout {
    /// Parse a layout from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, TemplateError> {
        Ok(toml::from_str(text)?)
    }

    /// Read a layout file
    pub fn read(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| crate::error::ConfigError::io_error(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Generate the configuration document
    pub fn generate(&self) -> Result<Document, TemplateError> {
        let mut job = build_block(BlockKind::Job, &self.job)?;
        if job.field(SUMMARY_PLOT_REGIONS).is_none() && !self.regions.is_empty() {
            let regions: Vec<&str> = self.regions.iter().map(|r| r.title.as_str()).collect();
            job.push_field(Field::new(SUMMARY_PLOT_REGIONS, regions.join(",")));
        }

        let mut doc = Document::with_job(job);
        if let Some(fit) = &self.fit {
            doc.push(build_block(BlockKind::Fit, fit)?)?;
        }
        let groups = [
            (BlockKind::Region, &self.regions),
            (BlockKind::Sample, &self.samples),
            (BlockKind::NormFactor, &self.norm_factors),
            (BlockKind::Systematic, &self.systematics),
        ];
        for (kind, layouts) in groups {
            for layout in layouts {
                doc.push(build_block(kind, layout)?)?;
            }
        }
        tracing::debug!(blocks = doc.len(), "generated configuration");
        Ok(doc)
    }
}

fn build_block(kind: BlockKind, layout: &BlockLayout) -> Result<Block, TemplateError> {
    let mut block = Block::new(kind, layout.title.clone());
    for (key, value) in &layout.settings {
        block.push_field(to_field(kind, &layout.title, key, value)?);
    }
    Ok(block)
}

fn to_field(
    kind: BlockKind,
    title: &str,
    key: &str,
    value: &toml::Value,
) -> Result<Field, TemplateError> {
    let unsupported = |found: &str| TemplateError::UnsupportedValue {
        block: format!("{kind} \"{title}\""),
        key: key.to_string(),
        found: found.to_string(),
    };
    let field = match value {
        toml::Value::String(s) => Field::quoted(key, s.clone()),
        toml::Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(scalar(item).ok_or_else(|| unsupported(item.type_str()))?);
            }
            Field::new(key, parts.join(","))
        }
        other => Field::new(key, scalar(other).ok_or_else(|| unsupported(other.type_str()))?),
    };
    Ok(field)
}

fn scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(true) => Some("TRUE".to_string()),
        toml::Value::Boolean(false) => Some("FALSE".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LAYOUT: &str = r#"
[job]
title = "tW"
Lumi = 139
DoTables = false

[fit]
title = "tW"
FitBlind = true

[[region]]
title = "reg1j1b"
Binning = [0.2, 0.4, 0.8]

[[region]]
title = "reg2j1b"

[[systematic]]
title = "ttbar_PS"
SubCategory = "Modeling"
Regions = ["reg1j1b"]
"#;

    #[test]
    fn generates_blocks_in_canonical_order() {
        let doc = Layout::from_toml_str(LAYOUT).unwrap().generate().unwrap();
        assert_eq!(
            doc.render(),
            "Job: \"tW\"\n  Lumi: 139\n  DoTables: FALSE\n  SummaryPlotRegions: reg1j1b,reg2j1b\n\n\
Fit: \"tW\"\n  FitBlind: TRUE\n\n\
Region: \"reg1j1b\"\n  Binning: 0.2,0.4,0.8\n\n\
Region: \"reg2j1b\"\n\n\
Systematic: \"ttbar_PS\"\n  SubCategory: \"Modeling\"\n  Regions: reg1j1b\n"
        );
    }

    #[test]
    fn rejects_nested_tables() {
        let layout = Layout::from_toml_str("[job]\ntitle = \"tW\"\n[job.extra]\na = 1\n").unwrap();
        assert!(matches!(
            layout.generate(),
            Err(TemplateError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn missing_job_is_a_layout_error() {
        assert!(matches!(
            Layout::from_toml_str("[[region]]\ntitle = \"r\"\n"),
            Err(TemplateError::Layout(_))
        ));
    }
}
