//! Wave scheduling
//!
//! Flattens a [`PipelineGraph`] into waves of [`WorkUnit`]s. Every unit of a
//! wave may run concurrently; a wave starts only after the previous one
//! completed. Empty nodes contribute no units and empty waves are dropped.

use crate::dag::PipelineGraph;
use crate::types::{Invocation, StageKind};
use serde::Serialize;

/// One invocation bound to the stage it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkUnit {
    /// Owning stage
    pub stage: StageKind,
    /// What to run
    pub invocation: Invocation,
}

/// Units that may run concurrently
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wave {
    /// Position in the schedule
    pub index: usize,
    /// Stages contributing units, in rank order
    pub stages: Vec<StageKind>,
    /// Units in stage then submission order
    pub units: Vec<WorkUnit>,
}

/// Ordered waves of a graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    waves: Vec<Wave>,
}

impl Schedule {
    /// Schedule every non-empty node of `graph`
    #[must_use]
    pub fn from_graph(graph: &PipelineGraph) -> Self {
        let mut waves = Vec::new();
        for kinds in graph.waves() {
            let mut wave = Wave {
                index: waves.len(),
                ..Wave::default()
            };
            for kind in kinds {
                let Some(node) = graph.node(kind).filter(|n| !n.is_empty()) else {
                    continue;
                };
                wave.stages.push(kind);
                wave.units.extend(node.invocations().iter().map(|inv| WorkUnit {
                    stage: kind,
                    invocation: inv.clone(),
                }));
            }
            if !wave.units.is_empty() {
                waves.push(wave);
            }
        }
        Self { waves }
    }

    /// Waves in execution order
    #[inline]
    #[must_use]
    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Total units
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.waves.iter().map(|w| w.units.len()).sum()
    }

    /// Whether nothing is scheduled
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::StageNode;

    fn unit(name: &str) -> Invocation {
        Invocation::merger(name.to_string(), Vec::new())
    }

    #[test]
    fn empty_nodes_are_skipped() {
        let mut graph = PipelineGraph::new();
        graph.add_node(StageNode::new(StageKind::N, Vec::new())).unwrap();
        graph
            .add_node(StageNode::new(StageKind::Wf, vec![unit("fit")]))
            .unwrap();
        graph
            .add_node(StageNode::new(StageKind::Dp, vec![unit("dp")]))
            .unwrap();
        graph
            .add_node(StageNode::new(StageKind::I, Vec::new()))
            .unwrap();
        graph.add_edge(StageKind::N, StageKind::Wf).unwrap();
        graph.add_edge(StageKind::Wf, StageKind::Dp).unwrap();
        graph.add_edge(StageKind::Wf, StageKind::I).unwrap();

        let schedule = Schedule::from_graph(&graph);
        assert_eq!(schedule.waves().len(), 2);
        assert_eq!(schedule.waves()[0].stages, vec![StageKind::Wf]);
        assert_eq!(schedule.waves()[0].index, 0);
        assert_eq!(schedule.waves()[1].stages, vec![StageKind::Dp]);
        assert_eq!(schedule.waves()[1].index, 1);
        assert_eq!(schedule.unit_count(), 2);
    }

    #[test]
    fn empty_graph_has_no_waves() {
        assert!(Schedule::from_graph(&PipelineGraph::new()).is_empty());
    }
}
