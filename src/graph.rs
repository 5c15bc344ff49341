//! Expression graph with structural common-subexpression elimination.
//!
//! Every distinct subexpression across all target formulas is interned once
//! into an arena; node references are arena indices. Ids are handed out in
//! depth-first post-order, so operands always carry smaller ids than their
//! consumers and id order doubles as first-appearance order.

use crate::error::CompileError;
use crate::expr::{Expr, Number};
use crate::ops::{ArgType, OperatorCatalogue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Symbol(String),
    Literal(Number),
    Op {
        op: &'static str,
        args: Vec<NodeId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl Node {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, NodeKind::Op { .. })
    }

    pub fn op(&self) -> Option<&'static str> {
        match self.kind {
            NodeKind::Op { op, .. } => Some(op),
            _ => None,
        }
    }

    pub fn args(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Op { args, .. } => args,
            _ => &[],
        }
    }
}

/// User-visible output name bound to the node computing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub root: NodeId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExprGraph {
    nodes: Vec<Node>,
}

impl ExprGraph {
    /// Graph over pre-built nodes, without interning or validation.
    #[cfg(test)]
    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Operator nodes in id order.
    pub fn op_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| !node.is_leaf())
    }

    pub fn count_op(&self, op: &str) -> usize {
        self.op_nodes().filter(|node| node.op() == Some(op)).count()
    }

    /// Rebuilds the canonical expression rooted at `id`.
    pub fn to_expr(&self, id: NodeId) -> Option<Expr> {
        let node = self.node(id)?;
        Some(match &node.kind {
            NodeKind::Symbol(name) => Expr::symbol(name.clone()),
            NodeKind::Literal(v) => Expr::Number(*v),
            NodeKind::Op { op, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.to_expr(*arg))
                    .collect::<Option<Vec<_>>>()?;
                Expr::call(*op, args)
            }
        })
    }

    pub fn dump(&self) -> String {
        let mut out = format!("=== ExprGraph ({} nodes) ===\n", self.nodes.len());
        for node in &self.nodes {
            match &node.kind {
                NodeKind::Symbol(name) => out.push_str(&format!("  {} = {name}\n", node.id)),
                NodeKind::Literal(v) => out.push_str(&format!("  {} = {v}\n", node.id)),
                NodeKind::Op { op, args } => {
                    let args: Vec<String> = args.iter().map(NodeId::to_string).collect();
                    out.push_str(&format!("  {} = {op}({})\n", node.id, args.join(", ")));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeSignature {
    Symbol(String),
    Literal((bool, u64)),
    Op {
        op: &'static str,
        args: Vec<NodeId>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Subexpressions resolved to an already interned node.
    pub cse_hit_count: usize,
    /// Bindings sharing a root with an earlier, differently named binding.
    pub alias_count: usize,
}

/// Interns target formulas into one [`ExprGraph`].
#[derive(Debug)]
pub struct GraphBuilder<'c> {
    catalogue: &'c OperatorCatalogue,
    nodes: Vec<Node>,
    node_by_sig: HashMap<NodeSignature, NodeId>,
    bindings: Vec<Binding>,
    root_by_name: HashMap<String, NodeId>,
    stats: BuildStats,
}

impl<'c> GraphBuilder<'c> {
    pub fn new(catalogue: &'c OperatorCatalogue) -> Self {
        Self {
            catalogue,
            nodes: Vec::new(),
            node_by_sig: HashMap::new(),
            bindings: Vec::new(),
            root_by_name: HashMap::new(),
            stats: BuildStats::default(),
        }
    }

    /// Interns `expr` and binds it to `name`.
    ///
    /// Rebinding a name to the same root is a no-op; rebinding it to a
    /// different root is [`CompileError::ConflictingOutput`].
    pub fn add_target(&mut self, name: &str, expr: &Expr) -> Result<NodeId, CompileError> {
        if expr.is_atom() {
            return Err(CompileError::InvalidExpression {
                expr: expr.to_string(),
                reason: "a factor must apply at least one operator".to_string(),
            });
        }
        let root = self.intern(expr)?;
        if let Some(prev) = self.root_by_name.get(name).copied() {
            if prev != root {
                return Err(CompileError::ConflictingOutput {
                    name: name.to_string(),
                });
            }
            return Ok(root);
        }
        if self.bindings.iter().any(|binding| binding.root == root) {
            self.stats.alias_count += 1;
        }
        self.root_by_name.insert(name.to_string(), root);
        self.bindings.push(Binding {
            name: name.to_string(),
            root,
        });
        Ok(root)
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    pub fn finish(self) -> (ExprGraph, Vec<Binding>) {
        (ExprGraph { nodes: self.nodes }, self.bindings)
    }

    fn intern(&mut self, expr: &Expr) -> Result<NodeId, CompileError> {
        if expr.is_infinite() {
            return Err(CompileError::InvalidExpression {
                expr: expr.to_string(),
                reason: "subexpression is unbounded for every row".to_string(),
            });
        }
        let (signature, kind) = match expr {
            Expr::Symbol(name) => (
                NodeSignature::Symbol(name.clone()),
                NodeKind::Symbol(name.clone()),
            ),
            Expr::Number(v) => (NodeSignature::Literal(v.key_bits()), NodeKind::Literal(*v)),
            Expr::Call { op, args } => {
                let catalogue = self.catalogue;
                let spec = catalogue.lookup(op)?;
                if spec.arity() != args.len() {
                    return Err(CompileError::InvalidArity {
                        name: op.clone(),
                        expected: spec.arity(),
                        actual: args.len(),
                    });
                }
                for (index, (expected, arg)) in spec.arg_types.iter().zip(args).enumerate() {
                    if let Some(found) = operand_mismatch(*expected, arg) {
                        return Err(CompileError::TypeMismatch {
                            node: expr.to_string(),
                            op: op.clone(),
                            index,
                            expected: expected.as_str(),
                            found,
                        });
                    }
                }
                let mut ids = Vec::with_capacity(args.len());
                for arg in args {
                    ids.push(self.intern(arg)?);
                }
                // Catalogue validation guarantees commutative operators are binary.
                if spec.commutative && ids[1] < ids[0] {
                    ids.swap(0, 1);
                }
                (
                    NodeSignature::Op {
                        op: spec.name,
                        args: ids.clone(),
                    },
                    NodeKind::Op {
                        op: spec.name,
                        args: ids,
                    },
                )
            }
        };
        if let Some(existing) = self.node_by_sig.get(&signature).copied() {
            if !expr.is_atom() {
                self.stats.cse_hit_count += 1;
            }
            return Ok(existing);
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { id, kind });
        self.node_by_sig.insert(signature, id);
        Ok(id)
    }
}

/// Operand kind that a user-authored formula may not supply for `expected`.
fn operand_mismatch(expected: ArgType, arg: &Expr) -> Option<&'static str> {
    let found = match arg.as_number() {
        Some(v) if v.is_integer() => "integer literal",
        Some(_) => "float literal",
        None => "array",
    };
    let ok = match expected {
        ArgType::Numeric => true,
        ArgType::Array => !arg.is_number(),
        ArgType::Int => arg.as_number().is_some_and(|v| v.is_integer()),
        ArgType::Float => arg.is_number(),
    };
    (!ok).then_some(found)
}

/// Builds a graph for `targets` in order; see [`GraphBuilder::add_target`].
pub fn build(
    targets: &[(String, Expr)],
    catalogue: &OperatorCatalogue,
) -> Result<(ExprGraph, Vec<Binding>), CompileError> {
    let mut builder = GraphBuilder::new(catalogue);
    for (name, expr) in targets {
        builder.add_target(name, expr)?;
    }
    Ok(builder.finish())
}
