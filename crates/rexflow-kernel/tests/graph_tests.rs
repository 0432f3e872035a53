use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rexflow_kernel::prelude::*;
use rexflow_test_utils::tw_document;

fn steps(list: &str) -> StepMask {
    list.parse().unwrap()
}

fn build(options: &PipelineOptions) -> PipelineGraph {
    let doc = tw_document();
    let args = ArgumentBuilder::new(&doc, "/ws/fit.conf");
    PipelineGraph::build(&args, options).unwrap()
}

fn kinds(graph: &PipelineGraph) -> Vec<StageKind> {
    graph.nodes().map(StageNode::kind).collect()
}

fn expected_kinds(options: &PipelineOptions) -> Vec<StageKind> {
    let mask = options.steps;
    let mut out = Vec::new();
    if options.produces_histograms() {
        out.push(StageKind::N);
        if options.granular_ntuple {
            out.push(StageKind::NMerge);
        }
    }
    if mask.contains(Step::Wf) {
        out.push(StageKind::Wf);
    }
    if mask.contains(Step::Dp) {
        out.push(StageKind::Dp);
    }
    if mask.contains(Step::R) {
        out.extend([StageKind::R, StageKind::RPlot]);
    }
    if mask.contains(Step::I) && options.systematics.is_none() {
        out.extend([StageKind::I, StageKind::ICombine]);
    }
    out
}

#[test]
fn ntuple_fit_draw_scenario() {
    let graph = build(&PipelineOptions::default().with_steps(steps("n,wf,dp")));
    assert_eq!(kinds(&graph), vec![StageKind::N, StageKind::Wf, StageKind::Dp]);
    assert_eq!(
        graph.edges(),
        vec![(StageKind::N, StageKind::Wf), (StageKind::Wf, StageKind::Dp)]
    );
    assert_eq!(graph.node(StageKind::N).unwrap().invocations().len(), 4);
}

#[test]
fn fit_rank_scenario() {
    let graph = build(&PipelineOptions::default().with_steps(steps("wf,r")));
    assert_eq!(kinds(&graph), vec![StageKind::Wf, StageKind::R, StageKind::RPlot]);
    assert_eq!(
        graph.edges(),
        vec![(StageKind::Wf, StageKind::R), (StageKind::R, StageKind::RPlot)]
    );
    let ranks: Vec<String> = graph
        .node(StageKind::R)
        .unwrap()
        .invocations()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        ranks,
        vec![
            "r /ws/fit.conf Ranking=ttbar_PS",
            "r /ws/fit.conf Ranking=JET_JER",
            "r /ws/fit.conf Ranking=tW_DRDS",
        ]
    );
}

#[test]
fn stages_attach_to_histograms_without_fit() {
    let graph = build(&PipelineOptions::default().with_steps(steps("n,dp,i")));
    assert_eq!(
        graph.edges(),
        vec![
            (StageKind::N, StageKind::Dp),
            (StageKind::N, StageKind::I),
            (StageKind::I, StageKind::ICombine),
        ]
    );

    let roots = build(&PipelineOptions::default().with_steps(steps("dp")));
    assert_eq!(roots.edge_count(), 0);
    assert_eq!(roots.waves(), vec![vec![StageKind::Dp]]);
}

#[test]
fn blind_variants_follow_nominal() {
    let graph = build(
        &PipelineOptions::default()
            .with_steps(steps("n,wf,i"))
            .with_also_blind(true),
    );
    assert_eq!(graph.node(StageKind::N).unwrap().invocations().len(), 4);

    let fit: Vec<String> = graph
        .node(StageKind::Wf)
        .unwrap()
        .invocations()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        fit,
        vec![
            "wf /ws/fit.conf Regions=reg1j1b,reg2j1b,reg2j2b",
            "wf /ws/fit.conf Regions=reg1j1b,reg2j1b,reg2j2b:FitBlind=TRUE:Suffix=_asimov",
        ]
    );
    // Jets, Modeling, Gammas, FullSyst, twice
    assert_eq!(graph.node(StageKind::I).unwrap().invocations().len(), 8);
    assert_eq!(graph.node(StageKind::ICombine).unwrap().invocations().len(), 2);
}

#[test]
fn systematic_filter_drops_grouped_impact() {
    let graph = build(
        &PipelineOptions::default()
            .with_systematics(Some(vec!["JET_JER".into(), "unknown".into()])),
    );
    assert!(!graph.contains(StageKind::I));
    assert!(!graph.contains(StageKind::ICombine));
    assert_eq!(graph.node(StageKind::R).unwrap().invocations().len(), 1);
    assert_eq!(
        graph.node(StageKind::Dp).unwrap().invocations()[0].to_string(),
        "dp /ws/fit.conf Systematics=JET_JER"
    );
}

#[test]
fn granular_ntuple_inserts_merge_stage() {
    let graph = build(
        &PipelineOptions::default()
            .with_steps(steps("n,wf"))
            .with_granular_ntuple(true),
    );
    assert_eq!(
        graph.edges(),
        vec![(StageKind::N, StageKind::NMerge), (StageKind::NMerge, StageKind::Wf)]
    );
    // ttbar_PS applies everywhere through its unrestricted block, JET_JER has
    // no region list, tW_DRDS only reg2j2b
    assert_eq!(graph.node(StageKind::N).unwrap().invocations().len(), 9);
    let merges = graph.node(StageKind::NMerge).unwrap().invocations();
    assert_eq!(merges.len(), 4);
    assert!(merges.iter().all(|m| m.tool == Tool::Merger));
    assert_eq!(merges[2].args[0], "tW/Histograms/tW_reg2j2b_histos.root");
    assert_eq!(merges[2].args.len(), 4);
}

#[test]
fn copied_histograms_skip_production() {
    let graph = build(&PipelineOptions::default().with_histograms_copied(true));
    assert!(!graph.contains(StageKind::N));
    assert!(graph.parents(StageKind::Wf).is_empty());
}

#[test]
fn full_pipeline_waves() {
    let graph = build(&PipelineOptions::default().with_granular_ntuple(true));
    assert_eq!(
        graph.waves(),
        vec![
            vec![StageKind::N],
            vec![StageKind::NMerge],
            vec![StageKind::Wf],
            vec![StageKind::Dp, StageKind::R, StageKind::I],
            vec![StageKind::RPlot, StageKind::ICombine],
        ]
    );
    assert_eq!(graph.children(StageKind::Wf), vec![StageKind::Dp, StageKind::R, StageKind::I]);
}

#[test]
fn every_step_mask_builds_a_valid_graph() {
    for bits in 0..StepMask::COUNT {
        let options = PipelineOptions::default().with_steps(StepMask::from_bits(bits));
        let graph = build(&options);

        assert_eq!(kinds(&graph), expected_kinds(&options), "mask {bits:#07b}");
        assert!(!graph.is_cyclic());
        for (from, to) in graph.edges() {
            assert!(graph.contains(from) && graph.contains(to));
            assert!(from.rank() < to.rank());
            assert!(!graph.is_ancestor(to, from));
        }
        let scheduled: usize = graph.waves().iter().map(Vec::len).sum();
        assert_eq!(scheduled, graph.node_count());
    }
}

proptest! {
    #[test]
    fn prop_graph_shape_matches_options(
        bits in 0..StepMask::COUNT,
        also_blind in any::<bool>(),
        granular in any::<bool>(),
        copied in any::<bool>(),
        filtered in any::<bool>(),
    ) {
        let systematics = filtered.then(|| vec!["ttbar_PS".to_string()]);
        let options = PipelineOptions::default()
            .with_steps(StepMask::from_bits(bits))
            .with_also_blind(also_blind)
            .with_granular_ntuple(granular)
            .with_histograms_copied(copied)
            .with_systematics(systematics);
        let graph = build(&options);

        prop_assert_eq!(kinds(&graph), expected_kinds(&options));
        prop_assert!(!graph.is_cyclic());
        for kind in kinds(&graph) {
            prop_assert!(!graph.is_ancestor(kind, kind));
            for parent in graph.parents(kind) {
                prop_assert!(parent.rank() < kind.rank());
            }
            let node = graph.node(kind).unwrap();
            if also_blind && kind.is_fit_dependent() {
                let blind = node
                    .invocations()
                    .iter()
                    .filter(|i| i.fragment().is_some_and(|f| f.ends_with("Suffix=_asimov")))
                    .count();
                prop_assert_eq!(blind * 2, node.invocations().len());
            }
        }
    }
}
