//! Blind (Asimov) toggles
//!
//! [`unblind`] is the textual form that operates on raw configuration text;
//! [`toggle_asimov`] works on the parsed document.

use crate::block::BlockKind;
use crate::document::Document;

/// Literal line marking a blind fit
pub const BLIND_LINE: &str = "  FitBlind: TRUE\n";

/// Replacement for [`BLIND_LINE`]
pub const UNBLIND_LINE: &str = "  FitBlind: FALSE\n";

/// Title suffix marking an Asimov configuration
pub const ASIMOV_SUFFIX: &str = "_asimov";

/// Replace the blind-fit line with its unblinded form
///
/// The text is returned unchanged when the literal is absent; a warning is
/// logged so the operator can tell the configuration was not blind.
#[must_use]
pub fn unblind(text: &str) -> String {
    if !text.contains(BLIND_LINE) {
        tracing::warn!("no '{}' line found; configuration left unchanged", BLIND_LINE.trim());
        return text.to_string();
    }
    text.replace(BLIND_LINE, UNBLIND_LINE)
}

/// State of a document after [`toggle_asimov`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsimovState {
    /// Blind fit on Asimov data, titles carry the `_asimov` suffix
    Asimov,
    /// Fit to observed data
    Observed,
}

/// Flip a document between Asimov and observed-data fits
///
/// A blind document is unblinded and the `_asimov` suffix is stripped from
/// the Job and Fit titles; otherwise the document is blinded and the suffix
/// appended.
#[must_use]
pub fn toggle_asimov(document: &Document) -> (Document, AsimovState) {
    let mut doc = document.clone();
    let to_asimov = !doc.is_blind();
    doc.set_blind(to_asimov);

    for block in doc.blocks_mut() {
        if !matches!(block.kind(), BlockKind::Job | BlockKind::Fit) {
            continue;
        }
        let title = block.title().to_string();
        if to_asimov && !title.ends_with(ASIMOV_SUFFIX) {
            block.set_title(format!("{title}{ASIMOV_SUFFIX}"));
        } else if !to_asimov {
            if let Some(stripped) = title.strip_suffix(ASIMOV_SUFFIX) {
                block.set_title(stripped);
            }
        }
    }

    let state = if to_asimov {
        AsimovState::Asimov
    } else {
        AsimovState::Observed
    };
    (doc, state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unblind_replaces_literal() {
        let text = "Fit: \"tW\"\n  FitBlind: TRUE\n  FitType: SPLUSB\n";
        assert_eq!(unblind(text), "Fit: \"tW\"\n  FitBlind: FALSE\n  FitType: SPLUSB\n");
    }

    #[test]
    fn unblind_without_literal_is_noop() {
        let text = "Fit: \"tW\"\n  FitType: SPLUSB\n";
        assert_eq!(unblind(text), text);
    }

    #[test]
    fn toggle_round_trips() {
        let doc = Document::parse("Job: \"tW\"\n\nFit: \"tW\"\n  FitBlind: FALSE\n").unwrap();

        let (asimov, state) = toggle_asimov(&doc);
        assert_eq!(state, AsimovState::Asimov);
        assert_eq!(asimov.job_name(), "tW_asimov");
        assert!(asimov.is_blind());

        let (observed, state) = toggle_asimov(&asimov);
        assert_eq!(state, AsimovState::Observed);
        assert_eq!(observed, doc);
    }
}
