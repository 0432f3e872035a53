//! rexflow configuration layer
//!
//! Parses TRExFitter-style configuration text into a structured
//! [`Document`] of typed [`Block`]s, edits it at field level, and renders it
//! back.
//!
//! # Format
//!
//! ```text
//! Job: "tW"
//!   SummaryPlotRegions: reg1j1b,reg2j1b
//!
//! Region: "reg1j1b"
//!   Type: SIGNAL
//!
//! Systematic: "ttbar_PS"
//!   SubCategory: "Modeling"
//! ```
//!
//! Blocks are separated by exactly one blank line and the `Job` block is
//! always first.
//!
//! # Example
//!
//! ```rust,ignore
//! use rexflow_config::{BlockKind, Document};
//!
//! let doc = Document::read("fit.conf")?;
//! let trimmed = doc.drop_region("reg1j1b").drop_systematics(&["ttbar_PS"]);
//! assert!(!trimmed.titles_of(BlockKind::Region).contains("reg1j1b"));
//! trimmed.write("fit.conf")?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod blind;
pub mod block;
pub mod document;
pub mod error;
pub mod template;

pub use blind::{toggle_asimov, unblind, AsimovState};
pub use block::{Block, BlockKind, Entry, Field};
pub use document::{Document, TitleMode, BLOCK_DELIMITER, FIT_BLIND, SUMMARY_PLOT_REGIONS};
pub use error::{ConfigError, ConfigResult, TemplateError};
pub use template::{BlockLayout, Layout};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
