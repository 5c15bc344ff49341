use crate::error::CompileError;
use crate::ops::{ArgType, PartitionKind};
use indexmap::IndexMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorSpec {
    /// Operator name as written in formulas and stored in canonical expressions.
    pub name: &'static str,
    /// Argument names, used to place keyword args at parse time.
    pub arg_names: &'static [&'static str],
    /// Expected operand type per argument slot.
    pub arg_types: &'static [ArgType],
    /// Grouping context required before the operator can be evaluated.
    pub partition: PartitionKind,
    /// Whether the first two operands may be swapped without changing the result.
    pub commutative: bool,
}

impl OperatorSpec {
    #[inline]
    pub const fn arity(&self) -> usize {
        self.arg_types.len()
    }

    #[inline]
    pub const fn is_partition_neutral(&self) -> bool {
        matches!(self.partition, PartitionKind::None)
    }

    pub fn arg_index(&self, arg_name: &str) -> Option<usize> {
        self.arg_names.iter().position(|name| *name == arg_name)
    }
}

/// Immutable operator table shared read-only by the graph builder, the GP
/// validator and the scheduler.
#[derive(Debug, Clone)]
pub struct OperatorCatalogue {
    specs: IndexMap<&'static str, OperatorSpec>,
}

impl OperatorCatalogue {
    /// Catalogue of every built-in operator, built on first use.
    pub fn standard() -> &'static Self {
        static STANDARD: OnceLock<OperatorCatalogue> = OnceLock::new();
        STANDARD.get_or_init(|| Self::builder().with_standard().build())
    }

    pub fn builder() -> CatalogueBuilder {
        CatalogueBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&OperatorSpec> {
        self.specs.get(name)
    }

    pub fn lookup(&self, name: &str) -> Result<&OperatorSpec, CompileError> {
        self.get(name).ok_or_else(|| CompileError::UnknownOperator {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Specs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &OperatorSpec> {
        self.specs.values()
    }
}

#[derive(Debug, Default)]
pub struct CatalogueBuilder {
    specs: Vec<OperatorSpec>,
}

impl CatalogueBuilder {
    pub fn with_standard(mut self) -> Self {
        self.specs.extend_from_slice(&OP_SPECS);
        self
    }

    pub fn with_spec(mut self, spec: OperatorSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Freezes the table.
    ///
    /// Panics on a malformed row: duplicate names, mismatched argument
    /// name/type lists, a window argument not typed int, or a group operator
    /// without a leading group key.
    pub fn build(self) -> OperatorCatalogue {
        let mut specs = IndexMap::with_capacity(self.specs.len());
        for spec in self.specs {
            validate_spec(&spec);
            if specs.insert(spec.name, spec).is_some() {
                panic!("duplicate operator name in catalogue: {}", spec.name);
            }
        }
        OperatorCatalogue { specs }
    }
}

fn validate_spec(spec: &OperatorSpec) {
    if spec.name.is_empty() {
        panic!("operator name must not be empty");
    }
    if spec.arg_names.len() != spec.arg_types.len() {
        panic!(
            "operator `{}` declares {} arg names but {} arg types",
            spec.name,
            spec.arg_names.len(),
            spec.arg_types.len()
        );
    }
    if spec.arity() == 0 {
        panic!("operator `{}` must take at least one argument", spec.name);
    }
    if spec.commutative && spec.arity() < 2 {
        panic!("operator `{}` is commutative but not binary", spec.name);
    }
    if matches!(spec.partition, PartitionKind::ByGroup)
        && (spec.arity() < 2 || spec.arg_types[0] != ArgType::Array)
    {
        panic!(
            "group operator `{}` must take an array group key as argument 0",
            spec.name
        );
    }
    if let Some(idx) = spec.arg_index("d") {
        if spec.arg_types[idx] != ArgType::Int {
            panic!("window argument of `{}` must be typed int", spec.name);
        }
    }
    if !spec.is_partition_neutral() && spec.arg_types.iter().all(|t| t.is_scalar_param()) {
        panic!(
            "partitioned operator `{}` must take at least one array argument",
            spec.name
        );
    }
}

const UNARY: &[&str] = &["x"];
const BINARY: &[&str] = &["x", "y"];
const WINDOW: &[&str] = &["x", "d"];
const PAIR_WINDOW: &[&str] = &["x", "y", "d"];
const GROUP: &[&str] = &["group", "x"];

const NUMERIC_1: &[ArgType] = &[ArgType::Numeric];
const NUMERIC_2: &[ArgType] = &[ArgType::Numeric, ArgType::Numeric];
const ARRAY_1: &[ArgType] = &[ArgType::Array];
const ARRAY_2: &[ArgType] = &[ArgType::Array, ArgType::Array];
const ARRAY_INT: &[ArgType] = &[ArgType::Array, ArgType::Int];
const ARRAY_2_INT: &[ArgType] = &[ArgType::Array, ArgType::Array, ArgType::Int];

pub const fn elem_unary(name: &'static str) -> OperatorSpec {
    OperatorSpec {
        name,
        arg_names: UNARY,
        arg_types: NUMERIC_1,
        partition: PartitionKind::None,
        commutative: false,
    }
}

pub const fn elem_binary(name: &'static str, commutative: bool) -> OperatorSpec {
    OperatorSpec {
        name,
        arg_names: BINARY,
        arg_types: NUMERIC_2,
        partition: PartitionKind::None,
        commutative,
    }
}

pub const fn ts_window(name: &'static str) -> OperatorSpec {
    OperatorSpec {
        name,
        arg_names: WINDOW,
        arg_types: ARRAY_INT,
        partition: PartitionKind::ByEntity,
        commutative: false,
    }
}

pub const fn ts_pair_window(name: &'static str, commutative: bool) -> OperatorSpec {
    OperatorSpec {
        name,
        arg_names: PAIR_WINDOW,
        arg_types: ARRAY_2_INT,
        partition: PartitionKind::ByEntity,
        commutative,
    }
}

pub const fn cs_unary(name: &'static str) -> OperatorSpec {
    OperatorSpec {
        name,
        arg_names: UNARY,
        arg_types: ARRAY_1,
        partition: PartitionKind::ByTime,
        commutative: false,
    }
}

pub const fn group_unary(name: &'static str) -> OperatorSpec {
    OperatorSpec {
        name,
        arg_names: GROUP,
        arg_types: ARRAY_2,
        partition: PartitionKind::ByGroup,
        commutative: false,
    }
}

const OP_SPECS: [OperatorSpec; 37] = [
    elem_binary("add", true),
    elem_binary("mul", true),
    elem_binary("pow", false),
    elem_binary("lt", false),
    elem_binary("le", false),
    elem_binary("gt", false),
    elem_binary("ge", false),
    elem_binary("eq", true),
    elem_binary("ne", true),
    elem_binary("and", true),
    elem_binary("or", true),
    elem_unary("not"),
    elem_unary("abs"),
    elem_unary("log"),
    elem_unary("sign"),
    elem_binary("max", true),
    elem_binary("min", true),
    OperatorSpec {
        name: "signed_power",
        arg_names: &["x", "e"],
        arg_types: &[ArgType::Array, ArgType::Float],
        partition: PartitionKind::None,
        commutative: false,
    },
    OperatorSpec {
        name: "if_else",
        arg_names: &["cond", "then", "otherwise"],
        arg_types: &[ArgType::Numeric, ArgType::Numeric, ArgType::Numeric],
        partition: PartitionKind::None,
        commutative: false,
    },
    ts_window("ts_mean"),
    ts_window("ts_sum"),
    ts_window("ts_max"),
    ts_window("ts_min"),
    ts_window("ts_std_dev"),
    ts_window("ts_delta"),
    ts_window("ts_delay"),
    ts_window("ts_rank"),
    ts_window("ts_product"),
    ts_window("ts_arg_max"),
    ts_window("ts_arg_min"),
    ts_window("ts_decay_linear"),
    ts_pair_window("ts_corr", true),
    ts_pair_window("ts_covariance", true),
    cs_unary("cs_rank"),
    cs_unary("cs_scale"),
    group_unary("gp_rank"),
    group_unary("gp_neutralize"),
];
