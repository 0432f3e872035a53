//! Core kernel types
//!
//! Stage kinds, the step mask selecting which stages run, and the
//! [`Invocation`] that describes one unit of work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Kind of a pipeline stage node
///
/// Declaration order follows [`StageKind::rank`], so ordered collections of
/// stage kinds iterate in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Histogram production (`n`)
    N,
    /// Merge of per-systematic histogram files
    NMerge,
    /// Workspace creation and fit (`wf`)
    Wf,
    /// Pre/post-fit plots (`dp`)
    Dp,
    /// Ranking of one nuisance parameter per invocation (`r`)
    R,
    /// Ranking plot (`r` with `Ranking=plot`)
    RPlot,
    /// Grouped impact per group (`i`)
    I,
    /// Combination of grouped impacts (`i` with `GroupedImpact=combine`)
    ICombine,
}

impl StageKind {
    /// Every kind, in rank order
    pub const ALL: [Self; 8] = [
        Self::N,
        Self::NMerge,
        Self::Wf,
        Self::Dp,
        Self::R,
        Self::RPlot,
        Self::I,
        Self::ICombine,
    ];

    /// Position in the pipeline; edges only go from lower to higher rank
    #[inline]
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::N => 0,
            Self::NMerge => 1,
            Self::Wf => 2,
            Self::Dp | Self::R | Self::I => 3,
            Self::RPlot | Self::ICombine => 4,
        }
    }

    /// Stage keyword passed to the fitter, `None` for the merge stage
    #[inline]
    #[must_use]
    pub const fn keyword(self) -> Option<&'static str> {
        match self {
            Self::N => Some("n"),
            Self::NMerge => None,
            Self::Wf => Some("wf"),
            Self::Dp => Some("dp"),
            Self::R | Self::RPlot => Some("r"),
            Self::I | Self::ICombine => Some("i"),
        }
    }

    /// Batch job name
    #[inline]
    #[must_use]
    pub const fn job_name(self) -> &'static str {
        match self {
            Self::N => "ntuple",
            Self::NMerge => "ntuple_merge",
            Self::Wf => "fit",
            Self::Dp => "draw",
            Self::R => "rank",
            Self::RPlot => "rank_draw",
            Self::I => "group",
            Self::ICombine => "group_combine",
        }
    }

    /// Whether the stage consumes a fit result and therefore has a blind variant
    #[inline]
    #[must_use]
    pub const fn is_fit_dependent(self) -> bool {
        !matches!(self, Self::N | Self::NMerge)
    }

    /// Requested step that brings this kind into the graph
    #[inline]
    #[must_use]
    pub const fn step(self) -> Step {
        match self {
            Self::N | Self::NMerge => Step::N,
            Self::Wf => Step::Wf,
            Self::Dp => Step::Dp,
            Self::R | Self::RPlot => Step::R,
            Self::I | Self::ICombine => Step::I,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::N => "N",
            Self::NMerge => "NMERGE",
            Self::Wf => "WF",
            Self::Dp => "DP",
            Self::R => "R",
            Self::RPlot => "RPLOT",
            Self::I => "I",
            Self::ICombine => "ICOMBINE",
        };
        f.write_str(name)
    }
}

/// A step the operator can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    /// Histograms
    N,
    /// Fit
    Wf,
    /// Plots
    Dp,
    /// Ranking
    R,
    /// Grouped impact
    I,
}

impl Step {
    /// Every step, in pipeline order
    pub const ALL: [Self; 5] = [Self::N, Self::Wf, Self::Dp, Self::R, Self::I];

    #[inline]
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Keyword used on the command line
    #[inline]
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::N => "n",
            Self::Wf => "wf",
            Self::Dp => "dp",
            Self::R => "r",
            Self::I => "i",
        }
    }
}

/// Subset of [`Step`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StepMask(u8);

impl StepMask {
    /// Number of distinct masks
    pub const COUNT: u8 = 32;

    /// No step
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every step
    #[inline]
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::COUNT - 1)
    }

    /// Mask from raw bits; bits above the five steps are ignored
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & (Self::COUNT - 1))
    }

    /// Raw bits
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Mask with `step` added
    #[inline]
    #[must_use]
    pub const fn with(self, step: Step) -> Self {
        Self(self.0 | step.bit())
    }

    /// Whether `step` is requested
    #[inline]
    #[must_use]
    pub const fn contains(self, step: Step) -> bool {
        self.0 & step.bit() != 0
    }

    /// Whether no step is requested
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Requested steps in pipeline order
    pub fn iter(self) -> impl Iterator<Item = Step> {
        Step::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl FromIterator<Step> for StepMask {
    fn from_iter<T: IntoIterator<Item = Step>>(iter: T) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

/// Error parsing a [`StepMask`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown step '{0}', expected one of n, wf, dp, r, i or all")]
pub struct UnknownStep(pub String);

impl FromStr for StepMask {
    type Err = UnknownStep;

    /// Parse a comma separated list such as `n,wf,dp`, or `all`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = Self::empty();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if token.eq_ignore_ascii_case("all") {
                mask = Self::all();
                continue;
            }
            let step = Step::ALL
                .into_iter()
                .find(|step| step.keyword().eq_ignore_ascii_case(token))
                .ok_or_else(|| UnknownStep(token.to_string()))?;
            mask = mask.with(step);
        }
        Ok(mask)
    }
}

impl fmt::Display for StepMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keywords: Vec<&str> = self.iter().map(Step::keyword).collect();
        f.write_str(&keywords.join(","))
    }
}

/// External tool an invocation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// The fitting executable
    Fitter,
    /// The histogram merge executable
    Merger,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fitter => "fitter",
            Self::Merger => "merger",
        })
    }
}

/// Nominal or blind (Asimov) variant of a fit-dependent invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    /// Observed data
    #[default]
    Nominal,
    /// Blind fit with the Asimov output suffix
    Blind,
}

/// One unit of work: a tool and its argument vector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invocation {
    /// Tool to run
    pub tool: Tool,
    /// Arguments, program name excluded
    pub args: Vec<String>,
}

impl Invocation {
    /// Fitter invocation `<keyword> <config> [<fragments joined by ':'>]`
    #[must_use]
    pub fn fitter(keyword: &str, config: &Path, fragments: &[String]) -> Self {
        let mut args = vec![keyword.to_string(), config.display().to_string()];
        if !fragments.is_empty() {
            args.push(fragments.join(":"));
        }
        Self {
            tool: Tool::Fitter,
            args,
        }
    }

    /// Merge invocation `<target> <sources>...`
    #[must_use]
    pub fn merger(target: String, sources: Vec<String>) -> Self {
        let mut args = Vec::with_capacity(sources.len() + 1);
        args.push(target);
        args.extend(sources);
        Self {
            tool: Tool::Merger,
            args,
        }
    }

    /// Colon separated fragment list, when present
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        match self.tool {
            Tool::Fitter => self.args.get(2).map(String::as_str),
            Tool::Merger => None,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_follows_declaration_order() {
        for pair in StageKind::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].rank() <= pair[1].rank());
        }
    }

    #[test]
    fn step_mask_parses_keywords() {
        let mask: StepMask = "n, wf,DP".parse().unwrap();
        assert!(mask.contains(Step::N));
        assert!(mask.contains(Step::Wf));
        assert!(mask.contains(Step::Dp));
        assert!(!mask.contains(Step::R));
        assert_eq!(mask.to_string(), "n,wf,dp");
        assert_eq!("all".parse::<StepMask>().unwrap(), StepMask::all());
        assert!("fit".parse::<StepMask>().is_err());
    }

    #[test]
    fn step_mask_covers_every_subset() {
        let masks: std::collections::HashSet<_> =
            (0..StepMask::COUNT).map(StepMask::from_bits).collect();
        assert_eq!(masks.len(), 32);
        assert_eq!(StepMask::from_bits(0xff), StepMask::all());
    }

    #[test]
    fn invocation_formats_fragments() {
        let inv = Invocation::fitter(
            "n",
            Path::new("/ws/fit.conf"),
            &["Regions=reg1j1b".to_string(), "Systematics=a,b".to_string()],
        );
        assert_eq!(inv.to_string(), "n /ws/fit.conf Regions=reg1j1b:Systematics=a,b");
        assert_eq!(inv.fragment(), Some("Regions=reg1j1b:Systematics=a,b"));

        let bare = Invocation::fitter("dp", Path::new("/ws/fit.conf"), &[]);
        assert_eq!(bare.args.len(), 2);
        assert_eq!(bare.fragment(), None);
    }
}
