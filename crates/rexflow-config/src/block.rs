//! Typed configuration blocks
//!
//! A block is a header line `Kind: "title"` followed by indented
//! `Key: value` fields and comment lines. Blocks are parsed once into
//! [`Block`] and rendered back from that structured form.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a top-level block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockKind {
    /// Document-wide settings, always the first block
    Job,
    /// Fit settings
    Fit,
    /// Analysis category
    Region,
    /// Sample definition
    Sample,
    /// Nuisance parameter
    Systematic,
    /// Free normalisation parameter
    NormFactor,
}

impl BlockKind {
    /// Every block kind, in canonical document order
    pub const ALL: [BlockKind; 6] = [
        BlockKind::Job,
        BlockKind::Fit,
        BlockKind::Region,
        BlockKind::Sample,
        BlockKind::NormFactor,
        BlockKind::Systematic,
    ];

    /// Keyword used in the header line
    #[inline]
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            BlockKind::Job => "Job",
            BlockKind::Fit => "Fit",
            BlockKind::Region => "Region",
            BlockKind::Sample => "Sample",
            BlockKind::Systematic => "Systematic",
            BlockKind::NormFactor => "NormFactor",
        }
    }

    /// Look up a kind from its header keyword
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == keyword)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A `Key: value` line inside a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field key
    pub key: String,
    /// Field value, without surrounding quotes
    pub value: String,
    /// Whether the value is rendered inside double quotes
    pub quoted: bool,
}

impl Field {
    /// Create an unquoted field
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            quoted: false,
        }
    }

    /// Create a quoted field
    #[must_use]
    pub fn quoted(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            quoted: true,
        }
    }
}

/// One line of a block body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entry {
    /// `  Key: value`
    Field(Field),
    /// Comment line, kept verbatim
    Comment(String),
}

/// A titled, kinded unit of the configuration document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    kind: BlockKind,
    title: String,
    /// Comment lines preceding the header inside the same chunk
    leading: Vec<String>,
    entries: Vec<Entry>,
}

const INDENT: &str = "  ";

pub(crate) fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('%') || trimmed.starts_with('#') || trimmed.starts_with("//")
}

fn unquote(value: &str) -> (String, bool) {
    let v = value.trim();
    if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
        (v[1..v.len() - 1].to_string(), true)
    } else {
        (v.to_string(), false)
    }
}

impl Block {
    /// Create an empty block
    #[must_use]
    pub fn new(kind: BlockKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            leading: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Builder-style field append
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.entries.push(Entry::Field(field));
        self
    }

    /// Builder-style comment line in the body
    #[must_use]
    pub fn with_comment(mut self, line: impl Into<String>) -> Self {
        self.entries.push(Entry::Comment(line.into()));
        self
    }

    /// Builder-style comment line above the header
    #[must_use]
    pub fn with_leading_comment(mut self, line: impl Into<String>) -> Self {
        self.leading.push(line.into());
        self
    }

    /// Parse one block chunk (no blank lines inside)
    ///
    /// `index` is only used for error reporting.
    pub fn parse(chunk: &str, index: usize) -> Result<Self, ConfigError> {
        let mut leading = Vec::new();
        let mut lines = chunk.lines();

        let header = loop {
            match lines.next() {
                Some(line) if is_comment(line) => leading.push(line.to_string()),
                Some(line) => break line,
                None => return Err(ConfigError::malformed(index, "block has no header line")),
            }
        };

        if header.starts_with(char::is_whitespace) {
            return Err(ConfigError::malformed(
                index,
                format!("expected a block header, found indented line {header:?}"),
            ));
        }
        let (keyword, title) = header.split_once(':').ok_or_else(|| {
            ConfigError::malformed(index, format!("header {header:?} has no ':' separator"))
        })?;
        let kind = BlockKind::from_keyword(keyword.trim()).ok_or_else(|| {
            ConfigError::malformed(index, format!("unknown block kind {:?}", keyword.trim()))
        })?;
        let (title, _) = unquote(title);
        if title.is_empty() {
            return Err(ConfigError::malformed(index, format!("{kind} block has an empty title")));
        }

        let mut entries = Vec::new();
        for line in lines {
            if is_comment(line) {
                entries.push(Entry::Comment(line.to_string()));
                continue;
            }
            if !line.starts_with(char::is_whitespace) {
                return Err(ConfigError::malformed(
                    index,
                    format!("unindented line {line:?} inside {kind} \"{title}\""),
                ));
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                ConfigError::malformed(index, format!("line {line:?} is not a 'Key: value' field"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::malformed(index, format!("line {line:?} has no key")));
            }
            let (value, quoted) = unquote(value);
            entries.push(Entry::Field(Field {
                key: key.to_string(),
                value,
                quoted,
            }));
        }

        Ok(Self {
            kind,
            title,
            leading,
            entries,
        })
    }

    /// Block kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Block title, without quotes
    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Replace the block title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// All body entries in order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Iterate over the fields of the block
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Field(f) => Some(f),
            Entry::Comment(_) => None,
        })
    }

    /// First value for `key` (keys compare case-insensitively)
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields()
            .find(|f| f.key.eq_ignore_ascii_case(key))
            .map(|f| f.value.as_str())
    }

    /// Comma-separated list value for `key`; empty when absent
    #[must_use]
    pub fn list_field(&self, key: &str) -> Vec<String> {
        self.field(key)
            .map(|v| {
                v.split(',')
                    .map(|s| unquote(s).0)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set `key` to `value`
    ///
    /// An existing field keeps its position and quoting; a new field is
    /// appended unquoted.
    pub fn set_field(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        for entry in &mut self.entries {
            if let Entry::Field(f) = entry {
                if f.key.eq_ignore_ascii_case(key) {
                    f.value = value;
                    return;
                }
            }
        }
        self.entries.push(Entry::Field(Field::new(key, value)));
    }

    /// Append a field without checking for an existing key
    pub fn push_field(&mut self, field: Field) {
        self.entries.push(Entry::Field(field));
    }

    /// Remove every field named `key`, returning whether one was removed
    pub fn remove_field(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !matches!(e, Entry::Field(f) if f.key.eq_ignore_ascii_case(key)));
        before != self.entries.len()
    }

    /// Whether the rendered block text contains `needle`
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.to_string().contains(needle)
    }

    pub(crate) fn render_into(&self, out: &mut String) {
        for line in &self.leading {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(self.kind.keyword());
        out.push_str(": \"");
        out.push_str(&self.title);
        out.push('"');
        for entry in &self.entries {
            out.push('\n');
            match entry {
                Entry::Field(f) if f.quoted => {
                    out.push_str(&format!("{INDENT}{}: \"{}\"", f.key, f.value));
                }
                Entry::Field(f) => out.push_str(&format!("{INDENT}{}: {}", f.key, f.value)),
                Entry::Comment(c) => out.push_str(c),
            }
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render_into(&mut out);
        f.write_str(&out)
    }
}
