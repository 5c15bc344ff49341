pub mod compile;
pub mod compile_expr;
pub mod error;
pub mod expr;
pub mod gp;
pub mod graph;
pub mod ops;
pub mod plan;
pub mod printer;
pub mod schedule;
pub mod types;

pub use compile::{Planner, SimplePlanner};
pub use error::{CodegenError, CompileError, GpError, PrintError, ScheduleError};
pub use expr::{Expr, Number};
pub use gp::{convert_inverse_encodings, is_invalid, EncodingMap, GpNode};
pub use graph::{Binding, ExprGraph, GraphBuilder, NodeId};
pub use ops::{ArgType, OperatorCatalogue, OperatorSpec, PartitionKind};
pub use plan::{CompileManifest, CompiledProgram, Statement};
pub use printer::{Dialect, PrinterRegistry};
pub use schedule::{Partition, Schedule, Stage};
pub use types::{CompileOptions, FactorRequest};

#[cfg(test)]
mod tests;
