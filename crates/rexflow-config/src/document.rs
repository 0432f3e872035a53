//! Configuration document: an ordered sequence of blocks
//!
//! The document is the single authoritative view of a configuration file.
//! Every structural query (titles, sub-block values) and every edit
//! (dropping regions or systematics, blinding) goes through this module.

use crate::block::{Block, BlockKind};
use crate::error::{ConfigError, ConfigResult};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Delimiter between two blocks: exactly one blank line
pub const BLOCK_DELIMITER: &str = "\n\n";

/// Job key holding the csv list of regions shown in summary plots
pub const SUMMARY_PLOT_REGIONS: &str = "SummaryPlotRegions";

/// Key controlling blind (Asimov) fits
pub const FIT_BLIND: &str = "FitBlind";

/// Whether title queries collapse duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleMode {
    /// First occurrence of each title, document order
    Unique,
    /// Every block, duplicates included, document order
    All,
}

/// Ordered sequence of typed blocks; the first block is always `Job`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Document {
    /// Parse configuration text
    ///
    /// # Errors
    /// `ConfigError::Malformed` if no block is found, the first block is
    /// not `Job`, a second `Job` appears, or any block fails to parse.
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let normalized = text.replace("\r\n", "\n");
        let mut blocks = Vec::new();

        for (index, chunk) in normalized.split(BLOCK_DELIMITER).enumerate() {
            let chunk = chunk.trim_matches('\n');
            if chunk.trim().is_empty() {
                continue;
            }
            blocks.push(Block::parse(chunk, index)?);
        }

        match blocks.first() {
            None => return Err(ConfigError::malformed(0, "document contains no blocks")),
            Some(first) if first.kind() != BlockKind::Job => {
                return Err(ConfigError::malformed(
                    0,
                    format!("first block must be Job, found {}", first.kind()),
                ));
            }
            Some(_) => {}
        }
        if let Some(pos) = blocks.iter().skip(1).position(|b| b.kind() == BlockKind::Job) {
            return Err(ConfigError::malformed(pos + 1, "second Job block"));
        }

        Ok(Self { blocks })
    }

    /// Create a document holding only a Job block
    #[must_use]
    pub fn with_job(job: Block) -> Self {
        debug_assert_eq!(job.kind(), BlockKind::Job);
        Self { blocks: vec![job] }
    }

    /// Read and parse a configuration file
    pub fn read(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
        Self::parse(&text)
    }

    /// Render and write to a file
    pub fn write(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.render()).map_err(|e| ConfigError::io_error(path, e))
    }

    /// Render blocks joined by the canonical delimiter, newline terminated
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                out.push_str(BLOCK_DELIMITER);
            }
            block.render_into(&mut out);
        }
        out.push('\n');
        out
    }

    /// All blocks in document order
    #[inline]
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Blocks of a given kind, in document order
    pub fn blocks_of(&self, kind: BlockKind) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(move |b| b.kind() == kind)
    }

    /// Number of blocks
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a parsed document holds at least the Job block
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The Job block
    #[inline]
    #[must_use]
    pub fn job(&self) -> &Block {
        &self.blocks[0]
    }

    /// Mutable Job block
    #[inline]
    pub fn job_mut(&mut self) -> &mut Block {
        &mut self.blocks[0]
    }

    /// Job title; the fitter writes its outputs under a directory of this name
    #[inline]
    #[must_use]
    pub fn job_name(&self) -> &str {
        self.job().title()
    }

    /// Append a block
    ///
    /// # Errors
    /// `ConfigError::Malformed` when appending a second Job block.
    pub fn push(&mut self, block: Block) -> ConfigResult<()> {
        if block.kind() == BlockKind::Job {
            return Err(ConfigError::malformed(self.blocks.len(), "second Job block"));
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Set of titles of the given kind (duplicates collapse)
    #[must_use]
    pub fn titles_of(&self, kind: BlockKind) -> BTreeSet<String> {
        self.blocks_of(kind).map(|b| b.title().to_string()).collect()
    }

    /// Titles of the given kind in document order
    #[must_use]
    pub fn titles(&self, kind: BlockKind, mode: TitleMode) -> Vec<String> {
        let mut seen = HashSet::new();
        self.blocks_of(kind)
            .map(Block::title)
            .filter(|t| mode == TitleMode::All || seen.insert(*t))
            .map(str::to_string)
            .collect()
    }

    /// Set of values of `key` across all blocks
    #[must_use]
    pub fn sub_block_values(&self, key: &str) -> BTreeSet<String> {
        self.blocks
            .iter()
            .flat_map(|b| b.fields())
            .filter(|f| f.key == key)
            .map(|f| f.value.trim().to_string())
            .collect()
    }

    /// Drop a region and every systematic mentioning it
    ///
    /// Removes every `Region` and `Systematic` block whose text contains
    /// `region`, then removes the dropped regions (and `region` itself)
    /// from the Job's `SummaryPlotRegions` list.
    #[must_use]
    pub fn drop_region(&self, region: &str) -> Self {
        let mut dropped: HashSet<String> = HashSet::new();
        dropped.insert(region.to_string());

        let mut blocks = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let removable = matches!(block.kind(), BlockKind::Region | BlockKind::Systematic);
            if removable && block.mentions(region) {
                if block.kind() == BlockKind::Region {
                    dropped.insert(block.title().to_string());
                }
                continue;
            }
            blocks.push(block.clone());
        }

        let mut doc = Self { blocks };
        let job = doc.job_mut();
        if job.field(SUMMARY_PLOT_REGIONS).is_some() {
            let kept: Vec<String> = job
                .list_field(SUMMARY_PLOT_REGIONS)
                .into_iter()
                .filter(|r| !dropped.contains(r))
                .collect();
            if kept.is_empty() {
                job.remove_field(SUMMARY_PLOT_REGIONS);
            } else {
                job.set_field(SUMMARY_PLOT_REGIONS, kept.join(","));
            }
        }
        tracing::debug!(region, dropped = dropped.len() - 1, "dropped region blocks");
        doc
    }

    /// Drop every systematic block whose title is in `titles`
    #[must_use]
    pub fn drop_systematics<S: AsRef<str>>(&self, titles: &[S]) -> Self {
        let titles: HashSet<&str> = titles.iter().map(AsRef::as_ref).collect();
        let blocks = self
            .blocks
            .iter()
            .filter(|b| !(b.kind() == BlockKind::Systematic && titles.contains(b.title())))
            .cloned()
            .collect();
        Self { blocks }
    }

    /// Set `FitBlind` on every block that carries it, and on the Fit block
    ///
    /// Returns the number of blocks changed.
    pub fn set_blind(&mut self, blind: bool) -> usize {
        let value = if blind { "TRUE" } else { "FALSE" };
        let mut changed = 0;
        for block in &mut self.blocks {
            let carries = block.field(FIT_BLIND).is_some();
            if carries || block.kind() == BlockKind::Fit {
                if block.field(FIT_BLIND) != Some(value) {
                    block.set_field(FIT_BLIND, value);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Whether any block requests a blind fit
    #[must_use]
    pub fn is_blind(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| b.field(FIT_BLIND).is_some_and(|v| v.eq_ignore_ascii_case("TRUE")))
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }
}

impl FromStr for Document {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
