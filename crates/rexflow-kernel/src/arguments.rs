//! Invocation builders
//!
//! Pure functions from a [`Document`] to the argument vectors each stage
//! runs. Executors never build arguments themselves; everything they run
//! comes from here.

use crate::settings::BlindSettings;
use crate::types::{Invocation, StageKind, Variant};
use rexflow_config::{BlockKind, Document, TitleMode};
use std::path::{Path, PathBuf};

/// Prefix marking validation regions, which are never fitted
pub const VALIDATION_PREFIX: &str = "VR";

/// Grouped impact groups always present besides the `SubCategory` values
pub const FIXED_IMPACT_GROUPS: [&str; 2] = ["Gammas", "FullSyst"];

/// Builds invocations for one document and configuration path
#[derive(Debug, Clone)]
pub struct ArgumentBuilder<'a> {
    document: &'a Document,
    config: PathBuf,
    blind: BlindSettings,
}

/// Per-(region, systematic) histogram jobs and the merges that follow them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GranularNtuple {
    /// One `n` invocation per (region, systematic) pair
    pub ntuple: Vec<Invocation>,
    /// One merge invocation per region
    pub merges: Vec<Invocation>,
}

impl<'a> ArgumentBuilder<'a> {
    /// Builder for `document`, whose invocations refer to `config`
    #[must_use]
    pub fn new(document: &'a Document, config: impl Into<PathBuf>) -> Self {
        Self {
            document,
            config: config.into(),
            blind: BlindSettings::default(),
        }
    }

    /// Override the blind fragments
    #[must_use]
    pub fn with_blind(mut self, blind: BlindSettings) -> Self {
        self.blind = blind;
        self
    }

    /// Configuration path passed to every fitter invocation
    #[inline]
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config
    }

    /// Region titles, unique, document order
    #[must_use]
    pub fn regions(&self) -> Vec<String> {
        self.document.titles(BlockKind::Region, TitleMode::Unique)
    }

    /// Region titles not starting with [`VALIDATION_PREFIX`]
    #[must_use]
    pub fn fit_regions(&self) -> Vec<String> {
        self.regions()
            .into_iter()
            .filter(|r| !r.starts_with(VALIDATION_PREFIX))
            .collect()
    }

    /// Systematic titles, optionally restricted by `filter`
    ///
    /// Without a filter: unique titles in document order. With a filter: the
    /// filter entries present in the document, in the filter's order; unknown
    /// titles are dropped with a warning.
    #[must_use]
    pub fn systematics(&self, filter: Option<&[String]>) -> Vec<String> {
        let known = self.document.titles(BlockKind::Systematic, TitleMode::Unique);
        let Some(filter) = filter else {
            return known;
        };
        let mut kept: Vec<String> = Vec::with_capacity(filter.len());
        for title in filter {
            if !known.contains(title) {
                tracing::warn!(systematic = %title, "unknown systematic dropped from filter");
            } else if !kept.contains(title) {
                kept.push(title.clone());
            }
        }
        kept
    }

    /// Histogram invocations, one per region
    ///
    /// `regions` restricts to the named regions present in the document.
    #[must_use]
    pub fn ntuple_invocations(
        &self,
        regions: Option<&[String]>,
        systematics: Option<&[String]>,
    ) -> Vec<Invocation> {
        let systematics = systematics.map(|f| self.systematics(Some(f)));
        self.selected_regions(regions)
            .into_iter()
            .map(|region| {
                let mut fragments = vec![format!("Regions={region}")];
                if let Some(systematics) = &systematics {
                    fragments.push(format!("Systematics={}", systematics.join(",")));
                }
                self.fitter(StageKind::N, fragments, Variant::Nominal)
            })
            .collect()
    }

    /// Granular histogram invocations and their per-region merges
    ///
    /// A systematic applies to a region when none of its blocks carries a
    /// `Regions` field, or one of them lists the region.
    #[must_use]
    pub fn granular_ntuple_invocations(
        &self,
        regions: Option<&[String]>,
        systematics: Option<&[String]>,
    ) -> GranularNtuple {
        let systematics = self.systematics(systematics);
        let job = self.document.job_name();
        let mut out = GranularNtuple::default();

        for region in self.selected_regions(regions) {
            let applicable: Vec<&String> = systematics
                .iter()
                .filter(|s| self.applies_to(s, &region))
                .collect();
            if applicable.is_empty() {
                continue;
            }
            let mut sources = Vec::with_capacity(applicable.len());
            for systematic in applicable {
                out.ntuple.push(self.fitter(
                    StageKind::N,
                    vec![
                        format!("Regions={region}"),
                        format!("Systematics={systematic}"),
                        format!("SaveSuffix=_{systematic}"),
                    ],
                    Variant::Nominal,
                ));
                sources.push(format!("{job}/Histograms/{job}_{region}_histos_{systematic}.root"));
            }
            let target = format!("{job}/Histograms/{job}_{region}_histos.root");
            out.merges.push(Invocation::merger(target, sources));
        }
        out
    }

    /// Fit invocation
    ///
    /// With `exclude_validation_regions` the fit is restricted to the
    /// non-validation regions.
    #[must_use]
    pub fn fit_invocation(
        &self,
        systematics: Option<&[String]>,
        exclude_validation_regions: bool,
        variant: Variant,
    ) -> Invocation {
        let mut fragments = Vec::new();
        if exclude_validation_regions {
            let regions = self.fit_regions();
            if !regions.is_empty() {
                fragments.push(format!("Regions={}", regions.join(",")));
            }
        }
        if let Some(systematics) = systematics {
            fragments.push(format!("Systematics={}", self.systematics(Some(systematics)).join(",")));
        }
        self.fitter(StageKind::Wf, fragments, variant)
    }

    /// Pre/post-fit plot invocation
    #[must_use]
    pub fn draw_invocation(&self, systematics: Option<&[String]>, variant: Variant) -> Invocation {
        let fragments = systematics
            .map(|f| vec![format!("Systematics={}", self.systematics(Some(f)).join(","))])
            .unwrap_or_default();
        self.fitter(StageKind::Dp, fragments, variant)
    }

    /// One ranking invocation per systematic
    #[must_use]
    pub fn rank_invocations(
        &self,
        systematics: Option<&[String]>,
        variant: Variant,
    ) -> Vec<Invocation> {
        self.systematics(systematics)
            .into_iter()
            .map(|s| self.fitter(StageKind::R, vec![format!("Ranking={s}")], variant))
            .collect()
    }

    /// Ranking plot invocation
    #[must_use]
    pub fn rank_plot_invocation(&self, variant: Variant) -> Invocation {
        self.fitter(StageKind::RPlot, vec!["Ranking=plot".to_string()], variant)
    }

    /// Impact groups: `SubCategory` values, then the fixed groups
    #[must_use]
    pub fn impact_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self
            .document
            .sub_block_values("SubCategory")
            .into_iter()
            .map(|g| g.trim_matches('"').to_string())
            .filter(|g| !g.is_empty())
            .collect();
        for fixed in FIXED_IMPACT_GROUPS {
            if !groups.iter().any(|g| g == fixed) {
                groups.push(fixed.to_string());
            }
        }
        groups
    }

    /// One grouped impact invocation per group
    #[must_use]
    pub fn grouped_impact_invocations(&self, variant: Variant) -> Vec<Invocation> {
        self.impact_groups()
            .into_iter()
            .map(|g| self.fitter(StageKind::I, vec![format!("GroupedImpact={g}")], variant))
            .collect()
    }

    /// Grouped impact combination invocation
    #[must_use]
    pub fn grouped_impact_combine_invocation(&self, variant: Variant) -> Invocation {
        self.fitter(
            StageKind::ICombine,
            vec!["GroupedImpact=combine".to_string()],
            variant,
        )
    }

    fn selected_regions(&self, filter: Option<&[String]>) -> Vec<String> {
        let all = self.regions();
        match filter {
            None => all,
            Some(filter) => all.into_iter().filter(|r| filter.contains(r)).collect(),
        }
    }

    fn applies_to(&self, systematic: &str, region: &str) -> bool {
        let mut restricted = false;
        for block in self
            .document
            .blocks_of(BlockKind::Systematic)
            .filter(|b| b.title() == systematic)
        {
            if block.field("Regions").is_none() {
                return true;
            }
            restricted = true;
            if block.list_field("Regions").iter().any(|r| r == region) {
                return true;
            }
        }
        !restricted
    }

    fn fitter(&self, kind: StageKind, mut fragments: Vec<String>, variant: Variant) -> Invocation {
        if variant == Variant::Blind {
            fragments.extend(self.blind.fragments().map(str::to_string));
        }
        let keyword = kind.keyword().unwrap_or_default();
        Invocation::fitter(keyword, &self.config, &fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"Job: "tW"
  SummaryPlotRegions: reg1j1b,reg2j1b,VRpt

Region: "reg1j1b"
  Type: SIGNAL

Region: "reg2j1b"
  Type: CONTROL

Region: "VRpt"
  Type: VALIDATION

Systematic: "ttbar_PS"
  SubCategory: "Modeling"

Systematic: "JET_JER"
  SubCategory: "Jets"
  Regions: reg2j1b
"#;

    fn strings(invocations: &[Invocation]) -> Vec<String> {
        invocations.iter().map(ToString::to_string).collect()
    }

    fn doc() -> Document {
        Document::parse(CONFIG).unwrap()
    }

    #[test]
    fn ntuple_per_region() {
        let doc = doc();
        let args = ArgumentBuilder::new(&doc, "/ws/fit.conf");
        assert_eq!(
            strings(&args.ntuple_invocations(None, None)),
            vec![
                "n /ws/fit.conf Regions=reg1j1b",
                "n /ws/fit.conf Regions=reg2j1b",
                "n /ws/fit.conf Regions=VRpt",
            ]
        );

        let filter = vec!["JET_JER".to_string(), "bogus".to_string()];
        let regions = vec!["reg2j1b".to_string(), "reg9".to_string()];
        assert_eq!(
            strings(&args.ntuple_invocations(Some(&regions), Some(&filter))),
            vec!["n /ws/fit.conf Regions=reg2j1b:Systematics=JET_JER"]
        );
    }

    #[test]
    fn fit_excludes_validation_regions() {
        let doc = doc();
        let args = ArgumentBuilder::new(&doc, "/ws/fit.conf");
        assert_eq!(
            args.fit_invocation(None, true, Variant::Nominal).to_string(),
            "wf /ws/fit.conf Regions=reg1j1b,reg2j1b"
        );
        assert_eq!(
            args.fit_invocation(None, false, Variant::Nominal).to_string(),
            "wf /ws/fit.conf"
        );
        let filter = vec!["ttbar_PS".to_string()];
        assert_eq!(
            args.fit_invocation(Some(&filter), true, Variant::Blind).to_string(),
            "wf /ws/fit.conf Regions=reg1j1b,reg2j1b:Systematics=ttbar_PS:FitBlind=TRUE:Suffix=_asimov"
        );
    }

    #[test]
    fn rank_and_impact_arguments() {
        let doc = doc();
        let args = ArgumentBuilder::new(&doc, "/ws/fit.conf");
        assert_eq!(
            strings(&args.rank_invocations(None, Variant::Nominal)),
            vec![
                "r /ws/fit.conf Ranking=ttbar_PS",
                "r /ws/fit.conf Ranking=JET_JER",
            ]
        );
        assert_eq!(
            args.rank_plot_invocation(Variant::Nominal).to_string(),
            "r /ws/fit.conf Ranking=plot"
        );
        assert_eq!(args.impact_groups(), vec!["Jets", "Modeling", "Gammas", "FullSyst"]);
        assert_eq!(
            args.grouped_impact_combine_invocation(Variant::Blind).to_string(),
            "i /ws/fit.conf GroupedImpact=combine:FitBlind=TRUE:Suffix=_asimov"
        );
    }

    #[test]
    fn draw_with_filter() {
        let doc = doc();
        let args = ArgumentBuilder::new(&doc, "/ws/fit.conf");
        assert_eq!(args.draw_invocation(None, Variant::Nominal).to_string(), "dp /ws/fit.conf");
        let filter = vec!["JET_JER".to_string(), "ttbar_PS".to_string()];
        assert_eq!(
            args.draw_invocation(Some(&filter), Variant::Nominal).to_string(),
            "dp /ws/fit.conf Systematics=JET_JER,ttbar_PS"
        );
    }

    #[test]
    fn granular_pairs_respect_region_lists() {
        let doc = doc();
        let args = ArgumentBuilder::new(&doc, "/ws/fit.conf");
        let granular = args.granular_ntuple_invocations(None, None);
        assert_eq!(
            strings(&granular.ntuple),
            vec![
                "n /ws/fit.conf Regions=reg1j1b:Systematics=ttbar_PS:SaveSuffix=_ttbar_PS",
                "n /ws/fit.conf Regions=reg2j1b:Systematics=ttbar_PS:SaveSuffix=_ttbar_PS",
                "n /ws/fit.conf Regions=reg2j1b:Systematics=JET_JER:SaveSuffix=_JET_JER",
                "n /ws/fit.conf Regions=VRpt:Systematics=ttbar_PS:SaveSuffix=_ttbar_PS",
            ]
        );
        assert_eq!(granular.merges.len(), 3);
        assert_eq!(
            granular.merges[1].args,
            vec![
                "tW/Histograms/tW_reg2j1b_histos.root",
                "tW/Histograms/tW_reg2j1b_histos_ttbar_PS.root",
                "tW/Histograms/tW_reg2j1b_histos_JET_JER.root",
            ]
        );
    }

    #[test]
    fn custom_blind_fragments() {
        let doc = doc();
        let args = ArgumentBuilder::new(&doc, "fit.conf").with_blind(BlindSettings {
            fragment: "FitBlind=TRUE".to_string(),
            suffix: String::new(),
        });
        assert_eq!(
            args.draw_invocation(None, Variant::Blind).to_string(),
            "dp fit.conf FitBlind=TRUE"
        );
    }
}
