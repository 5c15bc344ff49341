//! Boundary between an evolutionary search and the compile pipeline.
//!
//! The search hands over prefix trees of typed primitives. [`convert_inverse_encodings`]
//! turns one into a canonical [`Expr`], and [`is_invalid`] screens out
//! individuals that are degenerate or ill-typed against the operator catalogue.
//! Invalid trees are an expected outcome and are reported as `false`/`None`,
//! never as errors.

mod convert;
mod validate;

pub use convert::{convert_inverse_encodings, EncodingMap, InverseEncoding};
pub use validate::{is_invalid, type_violation, TypeViolation};

use crate::expr::Expr;
use crate::ops::OperatorCatalogue;
use tracing::debug;

/// One node of a prefix-ordered GP individual.
#[derive(Debug, Clone, PartialEq)]
pub enum GpNode {
    Primitive { name: String, arity: usize },
    /// Argument symbol or ephemeral constant.
    Terminal(Expr),
}

impl GpNode {
    pub fn primitive(name: impl Into<String>, arity: usize) -> Self {
        Self::Primitive {
            name: name.into(),
            arity,
        }
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Terminal(Expr::symbol(name))
    }

    pub const fn int(v: i64) -> Self {
        Self::Terminal(Expr::int(v))
    }

    pub const fn float(v: f64) -> Self {
        Self::Terminal(Expr::float(v))
    }

    #[inline]
    pub fn arity(&self) -> usize {
        match self {
            Self::Primitive { arity, .. } => *arity,
            Self::Terminal(_) => 0,
        }
    }
}

/// Converts and screens one individual; `None` when it must not enter the pipeline.
pub fn accept(
    tree: &[GpNode],
    encodings: &EncodingMap,
    catalogue: &OperatorCatalogue,
) -> Option<Expr> {
    let expr = match convert_inverse_encodings(tree, encodings) {
        Ok(expr) => expr,
        Err(err) => {
            debug!(error = %err, nodes = tree.len(), "gp tree rejected: malformed");
            return None;
        }
    };
    if is_invalid(&expr, catalogue) {
        return None;
    }
    Some(expr)
}
