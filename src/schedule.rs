//! Partition-aware staging of an [`ExprGraph`].
//!
//! Operator nodes are peeled in topological order (Kahn) and batched into
//! stages that share one partition, so the emitted code switches grouping
//! context as rarely as the dependency structure allows. Leaves are columns
//! or literals and are never scheduled.

use crate::error::ScheduleError;
use crate::graph::{ExprGraph, Node, NodeId};
use crate::ops::{OperatorCatalogue, PartitionKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, trace};

/// Resolved grouping context of one node. Group partitions carry the node
/// that supplies the group key, so operators grouped by different keys
/// never share a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Partition {
    None,
    ByEntity,
    ByTime,
    ByGroup(NodeId),
}

impl Partition {
    pub const fn kind(self) -> PartitionKind {
        match self {
            Self::None => PartitionKind::None,
            Self::ByEntity => PartitionKind::ByEntity,
            Self::ByTime => PartitionKind::ByTime,
            Self::ByGroup(_) => PartitionKind::ByGroup,
        }
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    fn of(node: &Node, catalogue: &OperatorCatalogue) -> Self {
        let Some(spec) = node.op().and_then(|op| catalogue.get(op)) else {
            return Self::None;
        };
        match spec.partition {
            PartitionKind::None => Self::None,
            PartitionKind::ByEntity => Self::ByEntity,
            PartitionKind::ByTime => Self::ByTime,
            PartitionKind::ByGroup => match node.args().first() {
                Some(key) => Self::ByGroup(*key),
                None => Self::None,
            },
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByGroup(key) => write!(f, "by-group({key})"),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub index: usize,
    pub partition: Partition,
    /// Nodes in evaluation order.
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub stages: Vec<Stage>,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.stages.iter().map(|stage| stage.nodes.len()).sum()
    }

    pub fn stage_of(&self, id: NodeId) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.nodes.contains(&id))
    }

    pub fn partitions(&self) -> Vec<Partition> {
        self.stages.iter().map(|stage| stage.partition).collect()
    }
}

/// Orders every operator node of `graph` into partition-consistent stages.
///
/// Ready nodes are taken smallest id first. A stage adopts the partition of
/// the node that opens it and then absorbs every ready node with the same
/// partition, including consumers released while the stage is filling.
/// Operands with a different partition are always in an earlier stage,
/// since a stage only ever holds nodes of its own partition.
pub fn schedule(graph: &ExprGraph, catalogue: &OperatorCatalogue) -> Result<Schedule, ScheduleError> {
    let len = graph.len();
    let mut partition = vec![Partition::None; len];
    let mut is_op = vec![false; len];
    for node in graph.op_nodes() {
        partition[node.id.index()] = Partition::of(node, catalogue);
        is_op[node.id.index()] = true;
    }

    let mut in_degree = vec![0_usize; len];
    let mut consumers: Vec<Vec<NodeId>> = vec![Vec::new(); len];
    for node in graph.op_nodes() {
        let deps: BTreeSet<NodeId> = node
            .args()
            .iter()
            .copied()
            .filter(|arg| is_op.get(arg.index()).copied().unwrap_or(false))
            .collect();
        in_degree[node.id.index()] = deps.len();
        for dep in deps {
            consumers[dep.index()].push(node.id);
        }
    }

    let mut ready: BTreeSet<NodeId> = graph
        .op_nodes()
        .map(|node| node.id)
        .filter(|id| in_degree[id.index()] == 0)
        .collect();
    let mut stages: Vec<Stage> = Vec::new();
    let mut processed = 0_usize;

    while let Some(first) = ready.pop_first() {
        let current = partition[first.index()];
        let mut nodes = vec![first];
        release(first, &consumers, &mut in_degree, &mut ready);
        loop {
            let next = ready
                .iter()
                .copied()
                .find(|id| partition[id.index()] == current);
            let Some(next) = next else {
                break;
            };
            ready.remove(&next);
            nodes.push(next);
            release(next, &consumers, &mut in_degree, &mut ready);
        }
        processed += nodes.len();
        trace!(
            stage = stages.len(),
            partition = %current,
            nodes = nodes.len(),
            "stage closed"
        );
        stages.push(Stage {
            index: stages.len(),
            partition: current,
            nodes,
        });
    }

    let op_count = is_op.iter().filter(|flag| **flag).count();
    if processed != op_count {
        let remaining: Vec<usize> = graph
            .op_nodes()
            .map(|node| node.id.index())
            .filter(|idx| in_degree[*idx] > 0)
            .collect();
        return Err(ScheduleError::CyclicOrUnschedulable { remaining });
    }
    debug!(stages = stages.len(), nodes = processed, "schedule built");
    Ok(Schedule { stages })
}

fn release(
    id: NodeId,
    consumers: &[Vec<NodeId>],
    in_degree: &mut [usize],
    ready: &mut BTreeSet<NodeId>,
) {
    for consumer in &consumers[id.index()] {
        let degree = &mut in_degree[consumer.index()];
        *degree -= 1;
        if *degree == 0 {
            ready.insert(*consumer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile_expr::parse_expression;
    use crate::expr::lower;
    use crate::graph::{build, Binding, NodeKind};

    fn build_graph(items: &[(&str, &str)]) -> (ExprGraph, Vec<Binding>) {
        let catalogue = OperatorCatalogue::standard();
        let targets: Vec<_> = items
            .iter()
            .map(|(name, source)| {
                let ast = parse_expression(source).expect("parse");
                (name.to_string(), lower(&ast, catalogue).expect("lower"))
            })
            .collect();
        build(&targets, catalogue).expect("build")
    }

    fn schedule_std(graph: &ExprGraph) -> Schedule {
        schedule(graph, OperatorCatalogue::standard()).expect("schedule")
    }

    fn op(op: &'static str, args: &[usize]) -> NodeKind {
        NodeKind::Op {
            op,
            args: args.iter().copied().map(NodeId).collect(),
        }
    }

    fn raw_graph(kinds: Vec<NodeKind>) -> ExprGraph {
        ExprGraph::from_nodes(
            kinds
                .into_iter()
                .enumerate()
                .map(|(idx, kind)| Node {
                    id: NodeId(idx),
                    kind,
                })
                .collect(),
        )
    }

    #[test]
    fn consecutive_equal_partitions_fuse_into_one_stage() {
        // none, none, by-entity, by-entity, none along one dependency chain.
        let (graph, _) = build_graph(&[("F", "sign(ts_sum(ts_mean(log(abs(CLOSE)), 5), 5))")]);
        let plan = schedule_std(&graph);
        assert_eq!(
            plan.partitions(),
            vec![Partition::None, Partition::ByEntity, Partition::None]
        );
        let sizes: Vec<usize> = plan.stages.iter().map(|stage| stage.nodes.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn operands_never_follow_their_consumers() {
        let (graph, _) = build_graph(&[
            ("A", "cs_rank(ts_mean(CLOSE, 5)) - ts_delta(cs_rank(OPEN), 3)"),
            ("B", "gp_neutralize(SECTOR, ts_corr(CLOSE, VOLUME, 10) * 2)"),
            ("C", "if_else(CLOSE > OPEN, ts_max(HIGH, 5), ts_min(LOW, 5))"),
        ]);
        let plan = schedule_std(&graph);
        assert_eq!(plan.node_count(), graph.op_nodes().count());
        for node in graph.op_nodes() {
            let stage = plan.stage_of(node.id).expect("scheduled");
            let pos = plan.stages[stage]
                .nodes
                .iter()
                .position(|id| *id == node.id)
                .expect("in stage");
            for arg in node.args() {
                let Some(arg_stage) = plan.stage_of(*arg) else {
                    continue;
                };
                assert!(arg_stage <= stage, "{arg} after {}", node.id);
                if arg_stage == stage {
                    let arg_pos = plan.stages[stage]
                        .nodes
                        .iter()
                        .position(|id| id == arg)
                        .expect("in stage");
                    assert!(arg_pos < pos);
                }
                if plan.stages[arg_stage].partition != plan.stages[stage].partition {
                    assert!(arg_stage < stage);
                }
            }
        }
    }

    #[test]
    fn mixed_partition_consumers_ready_together_share_a_stage() {
        let (graph, _) = build_graph(&[
            ("A", "cs_rank(ts_mean(CLOSE, 5))"),
            ("B", "cs_rank(ts_mean(OPEN, 5))"),
        ]);
        let plan = schedule_std(&graph);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.partitions(), vec![Partition::ByEntity, Partition::ByTime]);
        let stage_nodes: Vec<Vec<NodeId>> =
            plan.stages.iter().map(|stage| stage.nodes.clone()).collect();
        assert_eq!(
            stage_nodes,
            vec![vec![NodeId(2), NodeId(5)], vec![NodeId(3), NodeId(6)]]
        );
    }

    #[test]
    fn mixed_partition_consumer_joins_matching_group_stage() {
        let (graph, _) = build_graph(&[
            ("T", "ts_mean(CLOSE, 5)"),
            ("X", "gp_rank(SECTOR, OPEN)"),
            ("Y", "gp_rank(SECTOR, ts_mean(CLOSE, 5))"),
        ]);
        let plan = schedule_std(&graph);
        let stage_nodes: Vec<Vec<NodeId>> =
            plan.stages.iter().map(|stage| stage.nodes.clone()).collect();
        assert_eq!(
            stage_nodes,
            vec![vec![NodeId(2)], vec![NodeId(5), NodeId(6)]]
        );
        assert_eq!(plan.stages[1].partition, Partition::ByGroup(NodeId(3)));
    }

    #[test]
    fn different_group_keys_do_not_share_a_stage() {
        let (graph, _) = build_graph(&[
            ("A", "gp_rank(SECTOR, OPEN)"),
            ("B", "gp_rank(INDUSTRY, OPEN)"),
            ("C", "gp_rank(SECTOR, CLOSE)"),
        ]);
        let plan = schedule_std(&graph);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.stages[0].nodes.len(), 2);
        assert_eq!(plan.stages[0].partition.kind(), PartitionKind::ByGroup);
    }

    #[test]
    fn independent_entity_nodes_batch_together() {
        let (graph, _) = build_graph(&[
            ("MA_10", "ts_mean(CLOSE, 10)"),
            ("MA_40", "ts_mean(ts_mean(CLOSE, 5), 40)"),
        ]);
        let plan = schedule_std(&graph);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.stages[0].partition, Partition::ByEntity);
        assert_eq!(plan.stages[0].nodes.len(), 3);
    }

    #[test]
    fn cycles_are_reported_with_remaining_nodes() {
        let graph = raw_graph(vec![
            op("abs", &[1]),
            op("abs", &[0]),
            NodeKind::Symbol("CLOSE".to_string()),
            op("abs", &[2]),
        ]);
        match schedule(&graph, OperatorCatalogue::standard()) {
            Err(ScheduleError::CyclicOrUnschedulable { remaining }) => {
                assert_eq!(remaining, vec![0, 1]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn empty_graph_has_empty_schedule() {
        let plan = schedule_std(&ExprGraph::default());
        assert!(plan.is_empty());
    }
}
