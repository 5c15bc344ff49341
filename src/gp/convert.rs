use crate::error::GpError;
use crate::expr::Expr;
use crate::gp::GpNode;
use std::collections::HashMap;
use std::sync::OnceLock;

/// How a search-space primitive maps back onto canonical arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InverseEncoding {
    /// `sub(a, b)` -> `add(a, mul(-1, b))`
    Sub,
    /// `div(a, b)` -> `mul(a, pow(b, -1))`
    Div,
    Add,
    Mul,
    Max,
    Min,
    /// Identity wrapper used to type-tag integer constants.
    Pass,
}

impl InverseEncoding {
    fn apply(self, args: &[Expr]) -> Option<Expr> {
        let expr = match (self, args) {
            (Self::Sub, [a, b]) => Expr::sub(a.clone(), b.clone()),
            (Self::Div, [a, b]) => Expr::div(a.clone(), b.clone()),
            (Self::Add, [a, b]) => Expr::add(a.clone(), b.clone()),
            (Self::Mul, [a, b]) => Expr::mul(a.clone(), b.clone()),
            (Self::Max, [a, b]) => Expr::call("max", vec![a.clone(), b.clone()]),
            (Self::Min, [a, b]) => Expr::call("min", vec![a.clone(), b.clone()]),
            (Self::Pass, [a]) => a.clone(),
            _ => return None,
        };
        Some(expr)
    }
}

/// Primitive name -> inverse encoding. Names not in the map keep their own
/// call form.
#[derive(Debug, Clone, Default)]
pub struct EncodingMap {
    entries: HashMap<String, InverseEncoding>,
}

impl EncodingMap {
    /// Float (`f*`) and integer (`i*`) arithmetic primitives plus `pass_int`.
    pub fn standard() -> &'static Self {
        static STANDARD: OnceLock<EncodingMap> = OnceLock::new();
        STANDARD.get_or_init(|| {
            let mut map = Self::default();
            for prefix in ["f", "i"] {
                map.insert(format!("{prefix}sub"), InverseEncoding::Sub);
                map.insert(format!("{prefix}div"), InverseEncoding::Div);
                map.insert(format!("{prefix}add"), InverseEncoding::Add);
                map.insert(format!("{prefix}mul"), InverseEncoding::Mul);
                map.insert(format!("{prefix}max"), InverseEncoding::Max);
                map.insert(format!("{prefix}min"), InverseEncoding::Min);
            }
            map.insert("pass_int", InverseEncoding::Pass);
            map
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, encoding: InverseEncoding) {
        self.entries.insert(name.into(), encoding);
    }

    pub fn get(&self, name: &str) -> Option<InverseEncoding> {
        self.entries.get(name).copied()
    }
}

/// Reduces a prefix tree bottom-up into a canonical expression.
///
/// Each stack frame holds a node and the operands resolved for it so far; a
/// frame is reduced once its resolved count reaches the node's arity, and the
/// result is handed to the frame below.
pub fn convert_inverse_encodings(
    tree: &[GpNode],
    encodings: &EncodingMap,
) -> Result<Expr, GpError> {
    if tree.is_empty() {
        return Err(GpError::EmptyTree);
    }
    let mut stack: Vec<(&GpNode, Vec<Expr>)> = Vec::with_capacity(tree.len());
    for (pos, node) in tree.iter().enumerate() {
        stack.push((node, Vec::with_capacity(node.arity())));
        while let Some((top, resolved)) = stack.last() {
            if resolved.len() != top.arity() {
                break;
            }
            let Some((prim, args)) = stack.pop() else {
                break;
            };
            let reduced = reduce(prim, args, encodings);
            match stack.last_mut() {
                Some((_, parent_args)) => parent_args.push(reduced),
                None if pos + 1 == tree.len() => return Ok(reduced),
                None => {
                    return Err(GpError::TrailingNodes {
                        extra: tree.len() - pos - 1,
                    });
                }
            }
        }
    }
    Err(GpError::Incomplete {
        pending: stack.len(),
    })
}

fn reduce(node: &GpNode, args: Vec<Expr>, encodings: &EncodingMap) -> Expr {
    match node {
        GpNode::Terminal(expr) => expr.clone(),
        GpNode::Primitive { name, .. } => encodings
            .get(name)
            .and_then(|encoding| encoding.apply(&args))
            .unwrap_or_else(|| Expr::call(name.clone(), args)),
    }
}
