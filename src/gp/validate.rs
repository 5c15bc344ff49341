use crate::expr::Expr;
use crate::ops::{ArgType, OperatorCatalogue};
use tracing::trace;

/// First catalogue type rule an expression breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeViolation {
    pub op: String,
    pub index: usize,
    pub expected: ArgType,
}

/// Whether a converted individual must be discarded.
///
/// Rejected when the whole expression is a single atom, when any node is
/// provably infinite, or when a catalogue operator receives a bare literal
/// in an array slot or a non-integer literal in an integer slot. Operators
/// missing from the catalogue are not checked.
pub fn is_invalid(expr: &Expr, catalogue: &OperatorCatalogue) -> bool {
    if invalid_atom_infinite(expr) {
        trace!(expr = %expr, "gp expression rejected: atom or infinite");
        return true;
    }
    if let Some(violation) = type_violation(expr, catalogue) {
        trace!(
            expr = %expr,
            op = %violation.op,
            index = violation.index,
            expected = %violation.expected,
            "gp expression rejected: literal type mismatch"
        );
        return true;
    }
    false
}

fn invalid_atom_infinite(expr: &Expr) -> bool {
    expr.is_atom() || expr.preorder().any(Expr::is_infinite)
}

pub fn type_violation(expr: &Expr, catalogue: &OperatorCatalogue) -> Option<TypeViolation> {
    for node in expr.preorder() {
        let Expr::Call { op, args } = node else {
            continue;
        };
        let Some(spec) = catalogue.get(op) else {
            continue;
        };
        for (index, (expected, arg)) in spec.arg_types.iter().zip(args).enumerate() {
            let Some(value) = arg.as_number() else {
                continue;
            };
            let violated = match expected {
                ArgType::Array => true,
                ArgType::Int => !value.is_integer(),
                ArgType::Float | ArgType::Numeric => false,
            };
            if violated {
                return Some(TypeViolation {
                    op: op.clone(),
                    index,
                    expected: *expected,
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts_mean(x: Expr, d: Expr) -> Expr {
        Expr::call("ts_mean", vec![x, d])
    }

    fn invalid(expr: &Expr) -> bool {
        is_invalid(expr, OperatorCatalogue::standard())
    }

    #[test]
    fn single_atoms_are_rejected() {
        assert!(invalid(&Expr::symbol("CLOSE")));
        assert!(invalid(&Expr::int(3)));
        assert!(invalid(&Expr::float(0.5)));
    }

    #[test]
    fn infinite_nodes_are_rejected() {
        let div_by_zero = Expr::div(Expr::symbol("A"), Expr::int(0));
        assert!(invalid(&div_by_zero));
        let inf_literal = Expr::add(Expr::symbol("A"), Expr::float(f64::INFINITY));
        assert!(invalid(&inf_literal));
        let log_zero = Expr::add(
            Expr::symbol("CLOSE"),
            Expr::call("log", vec![Expr::int(0)]),
        );
        assert!(invalid(&log_zero));
        let log_close = Expr::add(
            Expr::symbol("CLOSE"),
            Expr::call("log", vec![Expr::symbol("OPEN")]),
        );
        assert!(!invalid(&log_close));
    }

    #[test]
    fn literal_in_array_slot_is_rejected() {
        assert!(invalid(&ts_mean(Expr::int(5), Expr::int(10))));
        assert!(!invalid(&ts_mean(Expr::symbol("CLOSE"), Expr::int(10))));
        let violation = type_violation(
            &Expr::call("cs_rank", vec![Expr::float(1.5)]),
            OperatorCatalogue::standard(),
        )
        .expect("violation");
        assert_eq!(violation.op, "cs_rank");
        assert_eq!(violation.expected, ArgType::Array);
    }

    #[test]
    fn float_literal_in_int_slot_is_rejected() {
        assert!(invalid(&ts_mean(Expr::symbol("CLOSE"), Expr::float(2.5))));
        assert!(invalid(&ts_mean(Expr::symbol("CLOSE"), Expr::float(2.0))));
    }

    #[test]
    fn violations_are_found_in_nested_nodes() {
        let nested = Expr::add(
            Expr::symbol("A"),
            Expr::call("cs_rank", vec![ts_mean(Expr::int(1), Expr::int(5))]),
        );
        let violation = type_violation(&nested, OperatorCatalogue::standard()).expect("nested");
        assert_eq!(violation.op, "ts_mean");
        assert_eq!(violation.index, 0);
    }

    #[test]
    fn numeric_and_unknown_operators_are_not_constrained() {
        assert!(!invalid(&Expr::mul(Expr::symbol("A"), Expr::float(0.5))));
        assert!(!invalid(&Expr::call("my_custom_op", vec![Expr::int(1), Expr::float(2.5)])));
    }
}
