//! Per-operator code emission for the dataframe dialects.
//!
//! Each `(operator, dialect)` pair maps to one [`PrintRule`]. Rules receive
//! operands that are already printed, together with their Python precedence,
//! and return the operator's own text. Operators without a rule fail through
//! a single fallback instead of being skipped.
//!
//! Adding an operator means adding its catalogue row and registering one rule
//! per dialect, either in the dialect tables below or at runtime through
//! [`PrinterRegistry::register`].

mod emit;
mod pandas;
mod polars;

pub use emit::{emit_program, synthetic_name, EmittedProgram};

use crate::error::PrintError;
use crate::expr::Number;
use crate::ops::OperatorCatalogue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Polars,
    Pandas,
}

impl Dialect {
    pub const ALL: [Dialect; 2] = [Dialect::Polars, Dialect::Pandas];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Polars => "polars",
            Self::Pandas => "pandas",
        }
    }

    /// Series reference for a column of the working frame.
    pub fn column(self, name: &str) -> String {
        match self {
            Self::Polars => format!("pl.col({})", py_str(name)),
            Self::Pandas => format!("df[{}]", py_str(name)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-quoted Python string literal.
pub(crate) fn py_str(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for c in raw.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Python operator precedence, loosest first.
pub mod prec {
    pub const CMP: u8 = 1;
    pub const BIT_OR: u8 = 2;
    pub const BIT_AND: u8 = 3;
    pub const ADD: u8 = 4;
    pub const MUL: u8 = 5;
    pub const UNARY: u8 = 6;
    pub const POW: u8 = 7;
    pub const ATOM: u8 = 8;
}

/// An operand as seen by a print rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub text: String,
    pub prec: u8,
    /// Set when the operand is a numeric literal; window sizes and exponents
    /// are printed bare.
    pub literal: Option<Number>,
}

impl Operand {
    pub fn series(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prec: prec::ATOM,
            literal: None,
        }
    }

    pub fn literal(value: Number) -> Self {
        Self {
            text: value.to_string(),
            prec: if value.is_negative() {
                prec::UNARY
            } else {
                prec::ATOM
            },
            literal: Some(value),
        }
    }

    #[inline]
    pub fn is_literal(&self) -> bool {
        self.literal.is_some()
    }

    #[inline]
    pub fn is_minus_one(&self) -> bool {
        self.literal.is_some_and(|v| v.as_f64() == -1.0)
    }

    fn wrapped(&self, wrap: bool) -> String {
        if wrap {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }
}

/// Text produced by a rule and the precedence of its outermost operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Printed {
    pub text: String,
    pub prec: u8,
}

impl Printed {
    pub fn atom(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prec: prec::ATOM,
        }
    }
}

/// Left-associative binary operator at `level`.
pub fn infix(lhs: &Operand, symbol: &str, rhs: &Operand, level: u8) -> Printed {
    Printed {
        text: format!(
            "{} {symbol} {}",
            lhs.wrapped(lhs.prec < level),
            rhs.wrapped(rhs.prec <= level)
        ),
        prec: level,
    }
}

pub fn prefix(symbol: &str, operand: &Operand) -> Printed {
    Printed {
        text: format!("{symbol}{}", operand.wrapped(operand.prec < prec::UNARY)),
        prec: prec::UNARY,
    }
}

/// `**` binds tighter than unary minus on its left and looser on its right.
pub fn power(base: &Operand, exponent: &Operand) -> Printed {
    Printed {
        text: format!(
            "{} ** {}",
            base.wrapped(base.prec <= prec::POW),
            exponent.wrapped(exponent.prec < prec::UNARY)
        ),
        prec: prec::POW,
    }
}

/// `recv.name(args)`; literal receivers are parenthesised so `5.abs()` never appears.
pub fn method(receiver: &Operand, name: &str, args: &[&str]) -> Printed {
    let wrap = receiver.prec < prec::ATOM || receiver.is_literal();
    Printed::atom(format!(
        "{}.{name}({})",
        receiver.wrapped(wrap),
        args.join(", ")
    ))
}

pub fn call(func: &str, args: &[&str]) -> Printed {
    Printed::atom(format!("{func}({})", args.join(", ")))
}

pub type RenderFn = fn(&[Operand]) -> Printed;

#[derive(Debug, Clone, Copy)]
pub struct PrintRule {
    pub arity: usize,
    pub render: RenderFn,
}

#[derive(Debug, Clone, Default)]
pub struct PrinterRegistry {
    tables: HashMap<Dialect, HashMap<&'static str, PrintRule>>,
}

impl PrinterRegistry {
    /// Rules for every standard catalogue operator in both dialects.
    pub fn standard() -> &'static Self {
        static STANDARD: OnceLock<PrinterRegistry> = OnceLock::new();
        STANDARD.get_or_init(|| {
            let mut registry = Self::default();
            for dialect in Dialect::ALL {
                register_python_operators(&mut registry, dialect);
            }
            polars::register(&mut registry);
            pandas::register(&mut registry);
            registry
        })
    }

    /// Adds or replaces the rule for `op` in `dialect`.
    pub fn register(
        &mut self,
        op: &'static str,
        dialect: Dialect,
        arity: usize,
        render: RenderFn,
    ) -> &mut Self {
        self.tables
            .entry(dialect)
            .or_default()
            .insert(op, PrintRule { arity, render });
        self
    }

    pub fn rule(&self, op: &str, dialect: Dialect) -> Option<PrintRule> {
        self.tables.get(&dialect)?.get(op).copied()
    }

    pub fn supports(&self, op: &str, dialect: Dialect) -> bool {
        self.rule(op, dialect).is_some()
    }

    pub fn print(
        &self,
        op: &str,
        dialect: Dialect,
        operands: &[Operand],
    ) -> Result<Printed, PrintError> {
        let Some(rule) = self.rule(op, dialect) else {
            return Err(unsupported(op, dialect));
        };
        if rule.arity != operands.len() {
            return Err(PrintError::OperandCount {
                op: op.to_string(),
                expected: rule.arity,
                actual: operands.len(),
            });
        }
        Ok((rule.render)(operands))
    }

    /// Catalogue operators with no rule for `dialect`, in catalogue order.
    pub fn missing<'a>(&self, catalogue: &'a OperatorCatalogue, dialect: Dialect) -> Vec<&'a str> {
        catalogue
            .iter()
            .map(|spec| spec.name)
            .filter(|name| !self.supports(name, dialect))
            .collect()
    }
}

/// Fallback for operators without a rule.
fn unsupported(op: &str, dialect: Dialect) -> PrintError {
    PrintError::UnsupportedOperator {
        op: op.to_string(),
        dialect,
    }
}

/// Arithmetic, comparison and boolean operators spelled the same in both
/// dialects.
fn register_python_operators(registry: &mut PrinterRegistry, dialect: Dialect) {
    registry
        .register("add", dialect, 2, |a| infix(&a[0], "+", &a[1], prec::ADD))
        .register("mul", dialect, 2, |a| match (&a[0], &a[1]) {
            (lhs, rhs) if lhs.is_minus_one() => prefix("-", rhs),
            (lhs, rhs) if rhs.is_minus_one() => prefix("-", lhs),
            (lhs, rhs) => infix(lhs, "*", rhs, prec::MUL),
        })
        .register("pow", dialect, 2, |a| {
            if a[1].is_minus_one() {
                infix(&Operand::literal(Number::Int(1)), "/", &a[0], prec::MUL)
            } else {
                power(&a[0], &a[1])
            }
        })
        .register("lt", dialect, 2, |a| infix(&a[0], "<", &a[1], prec::CMP))
        .register("le", dialect, 2, |a| infix(&a[0], "<=", &a[1], prec::CMP))
        .register("gt", dialect, 2, |a| infix(&a[0], ">", &a[1], prec::CMP))
        .register("ge", dialect, 2, |a| infix(&a[0], ">=", &a[1], prec::CMP))
        .register("eq", dialect, 2, |a| infix(&a[0], "==", &a[1], prec::CMP))
        .register("ne", dialect, 2, |a| infix(&a[0], "!=", &a[1], prec::CMP))
        .register("and", dialect, 2, |a| infix(&a[0], "&", &a[1], prec::BIT_AND))
        .register("or", dialect, 2, |a| infix(&a[0], "|", &a[1], prec::BIT_OR))
        .register("not", dialect, 1, |a| prefix("~", &a[0]))
        .register("signed_power", dialect, 2, |a| {
            call("_signed_power", &[&a[0].text, &a[1].text])
        })
        .register("ts_arg_max", dialect, 2, |a| {
            call("_rolling_argmax", &[&a[0].text, &a[1].text])
        })
        .register("ts_arg_min", dialect, 2, |a| {
            call("_rolling_argmin", &[&a[0].text, &a[1].text])
        })
        .register("ts_decay_linear", dialect, 2, |a| {
            call("_ts_decay_linear", &[&a[0].text, &a[1].text])
        })
        .register("cs_scale", dialect, 1, |a| call("_scale", &[&a[0].text]))
        .register("gp_neutralize", dialect, 2, |a| call("_neutralize", &[&a[1].text]));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Operand {
        Operand::series(Dialect::Polars.column(name))
    }

    fn int(v: i64) -> Operand {
        Operand::literal(Number::Int(v))
    }

    fn print(op: &str, dialect: Dialect, operands: &[Operand]) -> String {
        PrinterRegistry::standard()
            .print(op, dialect, operands)
            .expect("rule registered")
            .text
    }

    #[test]
    fn every_catalogue_operator_has_a_rule_in_every_dialect() {
        let registry = PrinterRegistry::standard();
        for dialect in Dialect::ALL {
            assert!(
                registry
                    .missing(OperatorCatalogue::standard(), dialect)
                    .is_empty(),
                "{dialect}: {:?}",
                registry.missing(OperatorCatalogue::standard(), dialect)
            );
        }
    }

    #[test]
    fn negation_and_reciprocal_are_recognised() {
        let x = col("X");
        assert_eq!(print("mul", Dialect::Polars, &[int(-1), x.clone()]), "-pl.col('X')");
        assert_eq!(print("mul", Dialect::Polars, &[x.clone(), int(-1)]), "-pl.col('X')");
        assert_eq!(print("pow", Dialect::Polars, &[x.clone(), int(-1)]), "1 / pl.col('X')");
        assert_eq!(print("pow", Dialect::Polars, &[x, int(2)]), "pl.col('X') ** 2");
    }

    #[test]
    fn operands_are_parenthesised_by_precedence() {
        let sum = Operand {
            text: "a + b".to_string(),
            prec: prec::ADD,
            literal: None,
        };
        let product = Operand {
            text: "a * b".to_string(),
            prec: prec::MUL,
            literal: None,
        };
        assert_eq!(infix(&sum, "*", &col("c"), prec::MUL).text, "(a + b) * pl.col('c')");
        assert_eq!(infix(&col("c"), "+", &product, prec::ADD).text, "pl.col('c') + a * b");
        assert_eq!(infix(&col("c"), "+", &sum, prec::ADD).text, "pl.col('c') + (a + b)");
        assert_eq!(power(&int(-2), &int(-1)).text, "(-2) ** -1");
        assert_eq!(prefix("-", &sum).text, "-(a + b)");
        assert_eq!(method(&sum, "abs", &[]).text, "(a + b).abs()");
        assert_eq!(method(&int(5), "abs", &[]).text, "(5).abs()");
    }

    #[test]
    fn window_literals_print_bare() {
        let close = col("CLOSE");
        assert_eq!(
            print("ts_mean", Dialect::Polars, &[close.clone(), int(10)]),
            "pl.col('CLOSE').rolling_mean(10)"
        );
        let pandas_close = Operand::series(Dialect::Pandas.column("CLOSE"));
        assert_eq!(
            print("ts_mean", Dialect::Pandas, &[pandas_close, int(10)]),
            "df['CLOSE'].rolling(10).mean()"
        );
    }

    #[test]
    fn missing_rule_fails_through_fallback() {
        let err = PrinterRegistry::standard()
            .print("ts_median", Dialect::Pandas, &[col("X"), int(3)])
            .expect_err("no rule");
        assert!(matches!(
            err,
            PrintError::UnsupportedOperator { ref op, dialect: Dialect::Pandas } if op == "ts_median"
        ));
    }

    #[test]
    fn operand_count_is_checked_before_rendering() {
        let err = PrinterRegistry::standard()
            .print("ts_mean", Dialect::Polars, &[col("X")])
            .expect_err("arity");
        assert!(matches!(
            err,
            PrintError::OperandCount {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn registry_accepts_custom_rules() {
        let mut registry = PrinterRegistry::standard().clone();
        registry.register("ts_median", Dialect::Polars, 2, |a| {
            method(&a[0], "rolling_median", &[&a[1].text])
        });
        let printed = registry
            .print("ts_median", Dialect::Polars, &[col("X"), int(3)])
            .expect("custom rule");
        assert_eq!(printed.text, "pl.col('X').rolling_median(3)");
        assert!(!registry.supports("ts_median", Dialect::Pandas));
    }

    #[test]
    fn column_names_are_quoted() {
        assert_eq!(Dialect::Polars.column("it's"), "pl.col('it\\'s')");
        assert_eq!(Dialect::Pandas.column("CLOSE"), "df['CLOSE']");
    }
}
