use crate::expr::Expr;
use crate::graph::{Binding, ExprGraph, NodeId};
use crate::printer::Dialect;
use crate::schedule::{Partition, Schedule};
use serde::{Deserialize, Serialize};

/// One emitted line, in program order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    /// Computes one node inside its stage function.
    Assign {
        stage: usize,
        node: NodeId,
        target: String,
        code: String,
    },
    /// Applies a stage function under its partition.
    Partition {
        stage: usize,
        function: String,
        partition: Partition,
        code: String,
    },
    /// Exposes a node under a user-visible output name.
    Alias {
        name: String,
        source: String,
        code: String,
    },
    Drop { columns: Vec<String>, code: String },
}

impl Statement {
    pub fn code(&self) -> &str {
        match self {
            Self::Assign { code, .. }
            | Self::Partition { code, .. }
            | Self::Alias { code, .. }
            | Self::Drop { code, .. } => code,
        }
    }

    pub fn stage(&self) -> Option<usize> {
        match self {
            Self::Assign { stage, .. } | Self::Partition { stage, .. } => Some(*stage),
            Self::Alias { .. } | Self::Drop { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileManifest {
    /// Number of requested top-level expressions.
    pub expr_count: usize,
    /// Interned graph vertices, leaves included.
    pub node_count: usize,
    /// Operator vertices; one assignment each.
    pub op_node_count: usize,
    /// Common-subexpression hits from node signature lookup.
    pub cse_hit_count: usize,
    /// Output names sharing a root with an earlier output.
    pub alias_count: usize,
    pub stage_count: usize,
    pub statement_count: usize,
    /// End-to-end compile latency in microseconds.
    pub compile_time_us: u64,
}

impl CompileManifest {
    #[inline]
    pub fn summary_line(&self) -> String {
        format!(
            "exprs={} nodes={} ops={} cse_hits={} aliases={} stages={} statements={} compile_us={}",
            self.expr_count,
            self.node_count,
            self.op_node_count,
            self.cse_hit_count,
            self.alias_count,
            self.stage_count,
            self.statement_count,
            self.compile_time_us
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    pub dialect: Dialect,
    pub graph: ExprGraph,
    pub bindings: Vec<Binding>,
    pub schedule: Schedule,
    pub statements: Vec<Statement>,
    pub source: String,
    pub manifest: CompileManifest,
}

impl CompiledProgram {
    pub fn assignments(&self) -> impl Iterator<Item = &Statement> {
        self.statements
            .iter()
            .filter(|statement| matches!(statement, Statement::Assign { .. }))
    }

    pub fn aliases(&self) -> impl Iterator<Item = &Statement> {
        self.statements
            .iter()
            .filter(|statement| matches!(statement, Statement::Alias { .. }))
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|binding| binding.name == name)
    }

    /// Canonical expression behind an output name.
    pub fn expr_of(&self, name: &str) -> Option<Expr> {
        self.graph.to_expr(self.binding(name)?.root)
    }

    /// `NAME = expr` lines reproducing the compiled bindings.
    pub fn formulas(&self) -> String {
        self.bindings
            .iter()
            .filter_map(|binding| {
                let expr = self.graph.to_expr(binding.root)?;
                Some(format!("{} = {expr}\n", binding.name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_summary_line_lists_counters_in_order() {
        let manifest = CompileManifest {
            expr_count: 2,
            node_count: 7,
            op_node_count: 3,
            cse_hit_count: 1,
            alias_count: 0,
            stage_count: 1,
            statement_count: 7,
            compile_time_us: 42,
        };
        assert_eq!(
            manifest.summary_line(),
            "exprs=2 nodes=7 ops=3 cse_hits=1 aliases=0 stages=1 statements=7 compile_us=42"
        );
    }

    #[test]
    fn statements_serialise_with_kind_tag() {
        let statement = Statement::Alias {
            name: "MA_10".to_string(),
            source: "_n2_ts_mean".to_string(),
            code: "df['MA_10'] = df['_n2_ts_mean']".to_string(),
        };
        let value = serde_json::to_value(&statement).expect("serialise");
        assert_eq!(value["kind"], "alias");
        assert_eq!(value["name"], "MA_10");
        assert_eq!(statement.stage(), None);
    }
}
