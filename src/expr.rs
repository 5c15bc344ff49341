//! Canonical expression form shared by the formula path and the GP path.
//!
//! Subtraction and division do not exist here: `a - b` is `add(a, mul(-1, b))`
//! and `a / b` is `mul(a, pow(b, -1))`. Arithmetic on two literals is folded
//! when the result is finite.

use crate::compile_expr::{BinaryOp, ExprAst, UnaryOp};
use crate::error::CompileError;
use crate::ops::OperatorCatalogue;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Lexically integral: `2` is, `2.0` is not.
    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int(_))
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        match self {
            Self::Int(_) => true,
            Self::Float(v) => v.is_finite(),
        }
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.as_f64() == 0.0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.as_f64() < 0.0
    }

    #[inline]
    pub fn is_minus_one(self) -> bool {
        matches!(self, Self::Int(-1))
    }

    /// Hashable identity; `Int(2)` and `Float(2.0)` stay distinct.
    #[inline]
    pub fn key_bits(self) -> (bool, u64) {
        match self {
            Self::Int(v) => (true, v as u64),
            Self::Float(v) => (false, v.to_bits()),
        }
    }

    fn negate(self) -> Option<Self> {
        match self {
            Self::Int(v) => v.checked_neg().map(Self::Int),
            Self::Float(v) => Some(Self::Float(-v)),
        }
    }

    fn fold_add(self, rhs: Self) -> Option<Self> {
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => a.checked_add(b).map(Self::Int),
            (a, b) => finite_float(a.as_f64() + b.as_f64()),
        }
    }

    fn fold_mul(self, rhs: Self) -> Option<Self> {
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => a.checked_mul(b).map(Self::Int),
            (a, b) => finite_float(a.as_f64() * b.as_f64()),
        }
    }

    fn fold_pow(self, rhs: Self) -> Option<Self> {
        match (self, rhs) {
            (Self::Int(base), Self::Int(exp)) if exp >= 0 => u32::try_from(exp)
                .ok()
                .and_then(|exp| base.checked_pow(exp))
                .map(Self::Int),
            (a, b) => finite_float(a.as_f64().powf(b.as_f64())),
        }
    }
}

fn finite_float(v: f64) -> Option<Number> {
    v.is_finite().then_some(Number::Float(v))
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            // Debug keeps the `.0` / exponent so the text re-parses as a float.
            Self::Float(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Symbol(String),
    Number(Number),
    Call { op: String, args: Vec<Expr> },
}

impl Expr {
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    pub const fn int(v: i64) -> Self {
        Self::Number(Number::Int(v))
    }

    pub const fn float(v: f64) -> Self {
        Self::Number(Number::Float(v))
    }

    pub fn call(op: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            op: op.into(),
            args,
        }
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
            if let Some(v) = a.fold_add(b) {
                return Self::Number(v);
            }
        }
        Self::call("add", vec![lhs, rhs])
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
            if let Some(v) = a.fold_mul(b) {
                return Self::Number(v);
            }
        }
        Self::call("mul", vec![lhs, rhs])
    }

    pub fn pow(base: Expr, exponent: Expr) -> Self {
        if let (Some(a), Some(b)) = (base.as_number(), exponent.as_number()) {
            if let Some(v) = a.fold_pow(b) {
                return Self::Number(v);
            }
        }
        Self::call("pow", vec![base, exponent])
    }

    pub fn neg(expr: Expr) -> Self {
        if let Some(v) = expr.as_number().and_then(Number::negate) {
            return Self::Number(v);
        }
        Self::mul(Self::int(-1), expr)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Self::add(lhs, Self::neg(rhs))
    }

    pub fn div(lhs: Expr, rhs: Expr) -> Self {
        Self::mul(lhs, Self::pow(rhs, Self::int(-1)))
    }

    #[inline]
    pub fn is_atom(&self) -> bool {
        !matches!(self, Self::Call { .. })
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    #[inline]
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn op(&self) -> Option<&str> {
        match self {
            Self::Call { op, .. } => Some(op),
            _ => None,
        }
    }

    pub fn args(&self) -> &[Expr] {
        match self {
            Self::Call { args, .. } => args,
            _ => &[],
        }
    }

    /// Whether this node, on its own, is provably unbounded or undefined: a
    /// non-finite literal, a literal zero raised to a negative literal power,
    /// or the log of a literal that is not positive.
    pub fn is_infinite(&self) -> bool {
        match self {
            Self::Number(v) => !v.is_finite(),
            Self::Call { op, args } => match (op.as_str(), args.as_slice()) {
                ("pow", [base, exp]) => matches!(
                    (base.as_number(), exp.as_number()),
                    (Some(base), Some(exp)) if base.is_zero() && exp.is_negative()
                ),
                ("log", [x]) => x
                    .as_number()
                    .is_some_and(|v| v.is_zero() || v.is_negative()),
                _ => false,
            },
            Self::Symbol(_) => false,
        }
    }

    /// Nodes in pre-order: parent first, then operands left to right.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder { stack: vec![self] }
    }

    pub fn size(&self) -> usize {
        self.preorder().count()
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Symbol(_) => prec::ATOM,
            Self::Number(v) if v.is_negative() => prec::UNARY,
            Self::Number(_) => prec::ATOM,
            Self::Call { op, args } => match (op.as_str(), args.as_slice()) {
                ("or", [_, _]) => prec::OR,
                ("and", [_, _]) => prec::AND,
                ("lt" | "le" | "gt" | "ge" | "eq" | "ne", [_, _]) => prec::CMP,
                ("add", [_, _]) => prec::ADD,
                ("mul", [lhs, _]) if is_minus_one(lhs) => prec::UNARY,
                ("mul", [_, _]) => prec::MUL,
                ("not", [_]) => prec::UNARY,
                ("pow", [_, _]) => prec::POW,
                _ => prec::ATOM,
            },
        }
    }
}

fn is_minus_one(expr: &Expr) -> bool {
    expr.as_number().is_some_and(Number::is_minus_one)
}

#[derive(Debug)]
pub struct Preorder<'a> {
    stack: Vec<&'a Expr>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = &'a Expr;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.args().iter().rev());
        Some(node)
    }
}

/// Formula-syntax precedence, mirroring the parser's grammar levels.
mod prec {
    pub(super) const OR: u8 = 1;
    pub(super) const AND: u8 = 2;
    pub(super) const CMP: u8 = 3;
    pub(super) const ADD: u8 = 4;
    pub(super) const MUL: u8 = 5;
    pub(super) const UNARY: u8 = 6;
    pub(super) const POW: u8 = 7;
    pub(super) const ATOM: u8 = 8;
}

struct Paren<'a> {
    expr: &'a Expr,
    wrap: bool,
}

impl fmt::Display for Paren<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wrap {
            write!(f, "({})", self.expr)
        } else {
            write!(f, "{}", self.expr)
        }
    }
}

fn left(expr: &Expr, level: u8) -> Paren<'_> {
    Paren {
        expr,
        wrap: expr.precedence() < level,
    }
}

fn right(expr: &Expr, level: u8) -> Paren<'_> {
    Paren {
        expr,
        wrap: expr.precedence() <= level,
    }
}

/// Re-parseable formula text; parsing it back yields an equal `Expr`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (op, args) = match self {
            Self::Symbol(name) => return f.write_str(name),
            Self::Number(v) => return write!(f, "{v}"),
            Self::Call { op, args } => (op.as_str(), args.as_slice()),
        };
        let infix = match op {
            "or" => Some(("|", prec::OR)),
            "and" => Some(("&", prec::AND)),
            "lt" => Some(("<", prec::CMP)),
            "le" => Some(("<=", prec::CMP)),
            "gt" => Some((">", prec::CMP)),
            "ge" => Some((">=", prec::CMP)),
            "eq" => Some(("==", prec::CMP)),
            "ne" => Some(("!=", prec::CMP)),
            "add" => Some(("+", prec::ADD)),
            "mul" => Some(("*", prec::MUL)),
            _ => None,
        };
        match (op, args, infix) {
            ("mul", [lhs, rhs], _) if is_minus_one(lhs) => {
                write!(f, "-{}", left(rhs, prec::UNARY))
            }
            ("not", [inner], _) => write!(f, "~{}", left(inner, prec::UNARY)),
            // `**` is right-associative: the base must bind tighter, the exponent may be unary.
            ("pow", [base, exp], _) => {
                write!(f, "{} ** {}", right(base, prec::POW), left(exp, prec::UNARY))
            }
            (_, [lhs, rhs], Some((symbol, level))) => {
                write!(f, "{} {symbol} {}", left(lhs, level), right(rhs, level))
            }
            _ => {
                write!(f, "{op}(")?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Lowers a parsed formula into canonical form.
///
/// Keyword arguments are placed by the catalogue's argument names; unknown
/// operators without keyword arguments pass through and are reported by the
/// graph builder.
pub fn lower(ast: &ExprAst, catalogue: &OperatorCatalogue) -> Result<Expr, CompileError> {
    LowerCtx { catalogue }.lower(ast)
}

struct LowerCtx<'a> {
    catalogue: &'a OperatorCatalogue,
}

impl LowerCtx<'_> {
    fn lower(&self, ast: &ExprAst) -> Result<Expr, CompileError> {
        match ast {
            ExprAst::Identifier(name) => Ok(Expr::symbol(name.clone())),
            ExprAst::Number(v) => Ok(Expr::Number(*v)),
            ExprAst::Unary { op, expr } => {
                let inner = self.lower(expr)?;
                Ok(match op {
                    UnaryOp::Plus => inner,
                    UnaryOp::Minus => Expr::neg(inner),
                    UnaryOp::Not => Expr::call("not", vec![inner]),
                })
            }
            ExprAst::Binary { op, lhs, rhs } => {
                let lhs = self.lower(lhs)?;
                let rhs = self.lower(rhs)?;
                Ok(match op {
                    BinaryOp::Add => Expr::add(lhs, rhs),
                    BinaryOp::Sub => Expr::sub(lhs, rhs),
                    BinaryOp::Mul => Expr::mul(lhs, rhs),
                    BinaryOp::Div => Expr::div(lhs, rhs),
                    BinaryOp::Pow => Expr::pow(lhs, rhs),
                    BinaryOp::Lt => Expr::call("lt", vec![lhs, rhs]),
                    BinaryOp::Le => Expr::call("le", vec![lhs, rhs]),
                    BinaryOp::Gt => Expr::call("gt", vec![lhs, rhs]),
                    BinaryOp::Ge => Expr::call("ge", vec![lhs, rhs]),
                    BinaryOp::Eq => Expr::call("eq", vec![lhs, rhs]),
                    BinaryOp::Ne => Expr::call("ne", vec![lhs, rhs]),
                    BinaryOp::And => Expr::call("and", vec![lhs, rhs]),
                    BinaryOp::Or => Expr::call("or", vec![lhs, rhs]),
                })
            }
            ExprAst::Call { name, args, kwargs } => {
                let mut lowered = Vec::with_capacity(args.len() + kwargs.len());
                for arg in args {
                    lowered.push(self.lower(arg)?);
                }
                if kwargs.is_empty() {
                    return Ok(Expr::call(name.clone(), lowered));
                }
                let spec = self.catalogue.lookup(name)?;
                let mut slots: Vec<Option<Expr>> = lowered.into_iter().map(Some).collect();
                slots.resize(spec.arity().max(slots.len()), None);
                for (key, value) in kwargs {
                    let idx = spec
                        .arg_index(key)
                        .ok_or_else(|| CompileError::InvalidExpression {
                            expr: name.clone(),
                            reason: format!("unexpected keyword arg `{key}` for `{name}`"),
                        })?;
                    if slots[idx].is_some() {
                        return Err(CompileError::InvalidExpression {
                            expr: name.clone(),
                            reason: format!("duplicate `{key}` in positional and keyword args"),
                        });
                    }
                    slots[idx] = Some(self.lower(value)?);
                }
                let supplied = slots.iter().filter(|slot| slot.is_some()).count();
                let args: Option<Vec<Expr>> = slots.into_iter().collect();
                args.map(|args| Expr::call(name.clone(), args))
                    .ok_or(CompileError::InvalidArity {
                        name: name.clone(),
                        expected: spec.arity(),
                        actual: supplied,
                    })
            }
        }
    }
}
