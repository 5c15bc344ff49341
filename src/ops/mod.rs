//! Operator layer entry.
//!
//! Extension path: add one row to `OP_SPECS` in `catalog.rs` (or extend a
//! catalogue through `OperatorCatalogue::builder`), then register one printer
//! rule per dialect in `printer/polars.rs` and `printer/pandas.rs`.

pub mod catalog;
pub mod spec;

pub use catalog::{CatalogueBuilder, OperatorCatalogue, OperatorSpec};
pub use spec::{ArgType, PartitionKind};
