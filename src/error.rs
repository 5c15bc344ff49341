use crate::graph::NodeId;
use crate::printer::Dialect;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("empty factor request")]
    EmptyRequest,
    #[error("invalid expression `{expr}`: {reason}")]
    InvalidExpression { expr: String, reason: String },
    #[error("unknown operator `{name}`")]
    UnknownOperator { name: String },
    #[error("operator `{name}` requires {expected} args, got {actual}")]
    InvalidArity {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("type mismatch in `{node}`: argument {index} of `{op}` expects {expected}, got {found}")]
    TypeMismatch {
        node: String,
        op: String,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("output name `{name}` is bound to two different expressions")]
    ConflictingOutput { name: String },
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Nodes left with unresolved dependencies after the topological sweep.
    #[error("graph is not schedulable: {} node(s) left on a dependency cycle", remaining.len())]
    CyclicOrUnschedulable { remaining: Vec<usize> },
}

#[derive(Debug, Error)]
pub enum PrintError {
    #[error("no `{dialect}` printer registered for operator `{op}`")]
    UnsupportedOperator { op: String, dialect: Dialect },
    #[error("printer for `{op}` expects {expected} operands, got {actual}")]
    OperandCount {
        op: String,
        expected: usize,
        actual: usize,
    },
    #[error("node {id} is referenced but not in the graph")]
    UnknownNode { id: NodeId },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GpError {
    #[error("empty gp tree")]
    EmptyTree,
    #[error("gp tree ended with {pending} unfinished primitive(s)")]
    Incomplete { pending: usize },
    #[error("gp tree has {extra} trailing node(s) after the root was closed")]
    TrailingNodes { extra: usize },
}

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Print(#[from] PrintError),
    #[error("invalid compile options: {0}")]
    Options(#[from] serde_json::Error),
}
