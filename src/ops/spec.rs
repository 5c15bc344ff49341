use serde::{Deserialize, Serialize};
use std::fmt;

/// Expected operand type for one operator argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    /// A data series: a column or the output of another node.
    Array,
    /// A scalar float parameter, written as a literal.
    Float,
    /// A scalar integer parameter (window, lag), written as an integer literal.
    Int,
    /// Elementwise operand: either a series or a scalar literal.
    Numeric,
}

impl ArgType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::Float => "float",
            Self::Int => "int",
            Self::Numeric => "numeric",
        }
    }

    #[inline]
    pub const fn is_scalar_param(self) -> bool {
        matches!(self, Self::Float | Self::Int)
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping context an operator needs its input arranged by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionKind {
    None,
    /// Time-series operators: one partition per asset.
    ByEntity,
    /// Cross-sectional operators: one partition per time instant.
    ByTime,
    /// Group operators: partition by time instant and the group key in argument 0.
    ByGroup,
}

impl PartitionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ByEntity => "by-entity",
            Self::ByTime => "by-time",
            Self::ByGroup => "by-group",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
