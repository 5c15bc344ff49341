use crate::compile_expr::parse_formulas;
use crate::error::{CodegenError, CompileError};
use crate::printer::Dialect;
use serde::{Deserialize, Serialize};

/// Knobs for the emitted program. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub dialect: Dialect,
    /// Time-instant column used for cross-sectional and group partitions.
    pub date_column: String,
    /// Entity column used for time-series partitions.
    pub asset_column: String,
    /// Drop the synthetic `_n<id>_<op>` columns once outputs are aliased.
    pub drop_intermediates: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Polars,
            date_column: "date".to_string(),
            asset_column: "asset".to_string(),
            drop_intermediates: true,
        }
    }
}

impl CompileOptions {
    pub fn from_json(raw: &str) -> Result<Self, CodegenError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorRequest {
    pub exprs: Vec<String>,
    /// Output name per expression; missing names are generated as `f<idx>_<op>`.
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub opts: CompileOptions,
}

impl FactorRequest {
    pub fn new(exprs: Vec<String>) -> Self {
        Self {
            exprs,
            outputs: Vec::new(),
            opts: CompileOptions::default(),
        }
    }

    pub fn named<N, E>(pairs: impl IntoIterator<Item = (N, E)>) -> Self
    where
        N: Into<String>,
        E: Into<String>,
    {
        let (outputs, exprs) = pairs
            .into_iter()
            .map(|(name, expr)| (name.into(), expr.into()))
            .unzip();
        Self {
            exprs,
            outputs,
            opts: CompileOptions::default(),
        }
    }

    /// Request from a block of `NAME = expr` lines.
    pub fn from_source(source: &str) -> Result<Self, CompileError> {
        let formulas = parse_formulas(source)?;
        Ok(Self::named(
            formulas
                .into_iter()
                .map(|formula| (formula.name, formula.source)),
        ))
    }

    pub fn with_options(mut self, opts: CompileOptions) -> Self {
        self.opts = opts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_fill_missing_json_fields_with_defaults() {
        let opts = CompileOptions::from_json(r#"{"dialect": "pandas", "asset_column": "code"}"#)
            .expect("valid options");
        assert_eq!(opts.dialect, Dialect::Pandas);
        assert_eq!(opts.asset_column, "code");
        assert_eq!(opts.date_column, "date");
        assert!(opts.drop_intermediates);
    }

    #[test]
    fn options_reject_unknown_dialect() {
        let err = CompileOptions::from_json(r#"{"dialect": "spark"}"#).expect_err("bad dialect");
        assert!(matches!(err, CodegenError::Options(_)));
    }

    #[test]
    fn request_from_formula_block_keeps_names_in_order() {
        let req = FactorRequest::from_source(
            "MA_10 = ts_mean(CLOSE, 10)\n# comment\nMA_40 = ts_mean(ts_mean(CLOSE, 5), 40)\n",
        )
        .expect("valid block");
        assert_eq!(req.outputs, vec!["MA_10", "MA_40"]);
        assert_eq!(req.exprs[0], "ts_mean(CLOSE, 10)");
        assert_eq!(req.opts, CompileOptions::default());
    }

    #[test]
    fn request_deserialises_with_default_options() {
        let req: FactorRequest =
            serde_json::from_str(r#"{"exprs": ["cs_rank(CLOSE)"]}"#).expect("valid request");
        assert!(req.outputs.is_empty());
        assert_eq!(req.opts.dialect, Dialect::Polars);
    }
}
