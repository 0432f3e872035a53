//! Stage DAG
//!
//! A [`PipelineGraph`] holds at most one node per [`StageKind`], each with
//! the invocations it runs. Edges are stored in a petgraph `DiGraphMap` and
//! may only go from a lower to a strictly higher [`StageKind::rank`], so the
//! graph is acyclic by construction.

use crate::arguments::ArgumentBuilder;
use crate::error::GraphError;
use crate::types::{Invocation, StageKind, Step, StepMask, Tool, Variant};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet};

/// What the graph should contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Requested steps
    pub steps: StepMask,
    /// Append blind invocations to fit-dependent stages
    pub also_blind: bool,
    /// Restrict to these systematics
    pub systematics: Option<Vec<String>>,
    /// Restrict histogram production to these regions
    pub regions: Option<Vec<String>>,
    /// One histogram job per (region, systematic) pair plus merges
    pub granular_ntuple: bool,
    /// Histograms were copied into the workspace; skip production
    pub histograms_copied: bool,
    /// Fit only non-validation regions
    pub exclude_validation_regions: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            steps: StepMask::all(),
            also_blind: false,
            systematics: None,
            regions: None,
            granular_ntuple: false,
            histograms_copied: false,
            exclude_validation_regions: true,
        }
    }
}

impl PipelineOptions {
    /// Set the requested steps
    #[must_use]
    pub fn with_steps(mut self, steps: StepMask) -> Self {
        self.steps = steps;
        self
    }

    /// Also run blind variants
    #[must_use]
    pub fn with_also_blind(mut self, also_blind: bool) -> Self {
        self.also_blind = also_blind;
        self
    }

    /// Restrict to a systematic list
    #[must_use]
    pub fn with_systematics(mut self, systematics: Option<Vec<String>>) -> Self {
        self.systematics = systematics;
        self
    }

    /// Restrict histogram production to a region list
    #[must_use]
    pub fn with_regions(mut self, regions: Option<Vec<String>>) -> Self {
        self.regions = regions;
        self
    }

    /// Granular histogram production
    #[must_use]
    pub fn with_granular_ntuple(mut self, granular: bool) -> Self {
        self.granular_ntuple = granular;
        self
    }

    /// Mark histograms as already present
    #[must_use]
    pub fn with_histograms_copied(mut self, copied: bool) -> Self {
        self.histograms_copied = copied;
        self
    }

    /// Whether histograms are produced by this run
    #[inline]
    #[must_use]
    pub fn produces_histograms(&self) -> bool {
        self.steps.contains(Step::N) && !self.histograms_copied
    }

    /// Tools the graph built from these options can invoke
    #[must_use]
    pub fn required_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::with_capacity(2);
        if !self.steps.is_empty() {
            tools.push(Tool::Fitter);
        }
        if self.produces_histograms() && self.granular_ntuple {
            tools.push(Tool::Merger);
        }
        tools
    }

    fn variants(&self) -> &'static [Variant] {
        if self.also_blind {
            &[Variant::Nominal, Variant::Blind]
        } else {
            &[Variant::Nominal]
        }
    }
}

fn expand(variants: &[Variant], f: &dyn Fn(Variant) -> Vec<Invocation>) -> Vec<Invocation> {
    variants.iter().flat_map(|v| f(*v)).collect()
}

/// One stage and its invocations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageNode {
    kind: StageKind,
    invocations: Vec<Invocation>,
}

impl StageNode {
    /// Node of `kind` running `invocations`
    #[must_use]
    pub fn new(kind: StageKind, invocations: Vec<Invocation>) -> Self {
        Self { kind, invocations }
    }

    /// Stage kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Invocations, in submission order
    #[inline]
    #[must_use]
    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// A node without invocations is trivially complete
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }
}

/// Directed acyclic graph of stages
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    nodes: BTreeMap<StageKind, StageNode>,
    edges: DiGraphMap<StageKind, ()>,
}

impl PipelineGraph {
    /// Empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for `options` from the invocation builder
    ///
    /// # Errors
    /// Only on an internal ordering violation; every edge added here follows
    /// stage rank.
    pub fn build(args: &ArgumentBuilder<'_>, options: &PipelineOptions) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        let systematics = options.systematics.as_deref();
        let variants = options.variants();

        let mut upstream = None;
        if options.produces_histograms() {
            let regions = options.regions.as_deref();
            if options.granular_ntuple {
                let granular = args.granular_ntuple_invocations(regions, systematics);
                graph.add_node(StageNode::new(StageKind::N, granular.ntuple))?;
                graph.add_node(StageNode::new(StageKind::NMerge, granular.merges))?;
                graph.add_edge(StageKind::N, StageKind::NMerge)?;
                upstream = Some(StageKind::NMerge);
            } else {
                let ntuple = args.ntuple_invocations(regions, systematics);
                graph.add_node(StageNode::new(StageKind::N, ntuple))?;
                upstream = Some(StageKind::N);
            }
        }

        if options.steps.contains(Step::Wf) {
            let fit = expand(variants, &|v| {
                vec![args.fit_invocation(systematics, options.exclude_validation_regions, v)]
            });
            graph.add_node(StageNode::new(StageKind::Wf, fit))?;
            graph.link(upstream, StageKind::Wf)?;
            upstream = Some(StageKind::Wf);
        }

        if options.steps.contains(Step::Dp) {
            let draw = expand(variants, &|v| vec![args.draw_invocation(systematics, v)]);
            graph.add_node(StageNode::new(StageKind::Dp, draw))?;
            graph.link(upstream, StageKind::Dp)?;
        }

        if options.steps.contains(Step::R) {
            let rank = expand(variants, &|v| args.rank_invocations(systematics, v));
            let plot = expand(variants, &|v| vec![args.rank_plot_invocation(v)]);
            graph.add_node(StageNode::new(StageKind::R, rank))?;
            graph.add_node(StageNode::new(StageKind::RPlot, plot))?;
            graph.link(upstream, StageKind::R)?;
            graph.add_edge(StageKind::R, StageKind::RPlot)?;
        }

        if options.steps.contains(Step::I) {
            if systematics.is_some() {
                tracing::info!("grouped impact skipped: a systematic filter is active");
            } else {
                let groups = expand(variants, &|v| args.grouped_impact_invocations(v));
                let combine = expand(variants, &|v| vec![args.grouped_impact_combine_invocation(v)]);
                graph.add_node(StageNode::new(StageKind::I, groups))?;
                graph.add_node(StageNode::new(StageKind::ICombine, combine))?;
                graph.link(upstream, StageKind::I)?;
                graph.add_edge(StageKind::I, StageKind::ICombine)?;
            }
        }

        tracing::debug!(
            steps = %options.steps,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            invocations = graph.invocation_count(),
            "pipeline graph built"
        );
        Ok(graph)
    }

    /// Add a node
    ///
    /// # Errors
    /// `GraphError::DuplicateNode` if a node of that kind exists.
    pub fn add_node(&mut self, node: StageNode) -> Result<(), GraphError> {
        let kind = node.kind();
        if self.nodes.contains_key(&kind) {
            return Err(GraphError::DuplicateNode(kind));
        }
        self.nodes.insert(kind, node);
        self.edges.add_node(kind);
        Ok(())
    }

    /// Add an edge `from -> to`
    ///
    /// # Errors
    /// `GraphError::NodeNotFound` for a missing endpoint,
    /// `GraphError::InvalidEdge` unless `to` has a strictly higher rank.
    pub fn add_edge(&mut self, from: StageKind, to: StageKind) -> Result<(), GraphError> {
        for kind in [from, to] {
            if !self.nodes.contains_key(&kind) {
                return Err(GraphError::NodeNotFound(kind));
            }
        }
        if from.rank() >= to.rank() {
            return Err(GraphError::InvalidEdge { from, to });
        }
        self.edges.add_edge(from, to, ());
        Ok(())
    }

    fn link(&mut self, from: Option<StageKind>, to: StageKind) -> Result<(), GraphError> {
        match from {
            Some(from) => self.add_edge(from, to),
            None => Ok(()),
        }
    }

    /// Node of `kind`
    #[inline]
    #[must_use]
    pub fn node(&self, kind: StageKind) -> Option<&StageNode> {
        self.nodes.get(&kind)
    }

    /// Whether a node of `kind` exists
    #[inline]
    #[must_use]
    pub fn contains(&self, kind: StageKind) -> bool {
        self.nodes.contains_key(&kind)
    }

    /// Nodes in rank order
    pub fn nodes(&self) -> impl Iterator<Item = &StageNode> {
        self.nodes.values()
    }

    /// Edges, sorted
    #[must_use]
    pub fn edges(&self) -> Vec<(StageKind, StageKind)> {
        let mut edges: Vec<_> = self.edges.all_edges().map(|(a, b, _)| (a, b)).collect();
        edges.sort_unstable();
        edges
    }

    /// Direct parents of `kind`
    #[must_use]
    pub fn parents(&self, kind: StageKind) -> Vec<StageKind> {
        self.neighbors(kind, Direction::Incoming)
    }

    /// Direct children of `kind`
    #[must_use]
    pub fn children(&self, kind: StageKind) -> Vec<StageKind> {
        self.neighbors(kind, Direction::Outgoing)
    }

    fn neighbors(&self, kind: StageKind, direction: Direction) -> Vec<StageKind> {
        if !self.edges.contains_node(kind) {
            return Vec::new();
        }
        let mut out: Vec<_> = self.edges.neighbors_directed(kind, direction).collect();
        out.sort_unstable();
        out
    }

    /// Nearest non-empty ancestors of `kind`, looking through empty nodes
    #[must_use]
    pub fn effective_parents(&self, kind: StageKind) -> BTreeSet<StageKind> {
        let mut out = BTreeSet::new();
        let mut pending = self.parents(kind);
        while let Some(parent) = pending.pop() {
            match self.node(parent) {
                Some(node) if !node.is_empty() => {
                    out.insert(parent);
                }
                _ => pending.extend(self.parents(parent)),
            }
        }
        out
    }

    /// Whether a path leads from `ancestor` to `kind`
    #[must_use]
    pub fn is_ancestor(&self, ancestor: StageKind, kind: StageKind) -> bool {
        ancestor != kind
            && self.contains(ancestor)
            && self.contains(kind)
            && has_path_connecting(&self.edges, ancestor, kind, None)
    }

    /// Whether the edge set contains a cycle
    #[must_use]
    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.edges)
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.edge_count()
    }

    /// Total invocations over all nodes
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.nodes.values().map(|n| n.invocations().len()).sum()
    }

    /// Whether the graph has no node
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes grouped by topological depth
    ///
    /// A node's depth is one more than the deepest of its parents; roots have
    /// depth zero. Kinds within a wave are in rank order.
    #[must_use]
    pub fn waves(&self) -> Vec<Vec<StageKind>> {
        let Ok(order) = toposort(&self.edges, None) else {
            return Vec::new();
        };
        let mut depth: BTreeMap<StageKind, usize> = BTreeMap::new();
        for kind in order {
            let d = self
                .parents(kind)
                .iter()
                .filter_map(|p| depth.get(p))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(kind, d);
        }

        let mut waves: Vec<Vec<StageKind>> = Vec::new();
        for (kind, d) in depth {
            if waves.len() <= d {
                waves.resize_with(d + 1, Vec::new);
            }
            waves[d].push(kind);
        }
        waves
    }
}
