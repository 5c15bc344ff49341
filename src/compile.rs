use crate::compile_expr::parse_expression;
use crate::error::{CodegenError, CompileError};
use crate::expr::{lower, Expr};
use crate::graph::GraphBuilder;
use crate::ops::OperatorCatalogue;
use crate::plan::{CompileManifest, CompiledProgram};
use crate::printer::{emit_program, PrinterRegistry};
use crate::schedule::schedule;
use crate::types::{CompileOptions, FactorRequest};
use std::time::Instant;
use tracing::debug;

pub trait Planner {
    /// Formula path: parse, lower, build, schedule and print a request.
    fn compile(&self, req: &FactorRequest) -> Result<CompiledProgram, CodegenError>;

    /// Canonical-expression path, used for GP individuals that were already
    /// converted and screened.
    fn compile_exprs(
        &self,
        targets: &[(String, Expr)],
        opts: &CompileOptions,
    ) -> Result<CompiledProgram, CodegenError>;
}

#[derive(Debug, Clone, Copy)]
pub struct SimplePlanner<'a> {
    catalogue: &'a OperatorCatalogue,
    printers: &'a PrinterRegistry,
}

impl Default for SimplePlanner<'static> {
    fn default() -> Self {
        Self::new(OperatorCatalogue::standard(), PrinterRegistry::standard())
    }
}

impl<'a> SimplePlanner<'a> {
    pub fn new(catalogue: &'a OperatorCatalogue, printers: &'a PrinterRegistry) -> Self {
        Self {
            catalogue,
            printers,
        }
    }

    pub fn catalogue(&self) -> &'a OperatorCatalogue {
        self.catalogue
    }

    fn lower_request(&self, req: &FactorRequest) -> Result<Vec<(String, Expr)>, CompileError> {
        let mut targets = Vec::with_capacity(req.exprs.len());
        for (idx, source) in req.exprs.iter().enumerate() {
            let ast = parse_expression(source)?;
            let expr = lower(&ast, self.catalogue)?;
            let name = req
                .outputs
                .get(idx)
                .cloned()
                .unwrap_or_else(|| default_output_name(idx, &expr));
            targets.push((name, expr));
        }
        Ok(targets)
    }

    fn compile_targets(
        &self,
        targets: &[(String, Expr)],
        opts: &CompileOptions,
        started_at: Instant,
    ) -> Result<CompiledProgram, CodegenError> {
        if targets.is_empty() {
            return Err(CompileError::EmptyRequest.into());
        }
        let mut builder = GraphBuilder::new(self.catalogue);
        for (name, expr) in targets {
            builder.add_target(name, expr)?;
        }
        let stats = builder.stats();
        let (graph, bindings) = builder.finish();
        let schedule = schedule(&graph, self.catalogue)?;
        let emitted = emit_program(&graph, &schedule, &bindings, self.printers, opts)?;

        let manifest = CompileManifest {
            expr_count: targets.len(),
            node_count: graph.len(),
            op_node_count: graph.op_nodes().count(),
            cse_hit_count: stats.cse_hit_count,
            alias_count: stats.alias_count,
            stage_count: schedule.len(),
            statement_count: emitted.statements.len(),
            compile_time_us: started_at.elapsed().as_micros() as u64,
        };
        debug!(dialect = %opts.dialect, "{}", manifest.summary_line());
        Ok(CompiledProgram {
            dialect: opts.dialect,
            graph,
            bindings,
            schedule,
            statements: emitted.statements,
            source: emitted.source,
            manifest,
        })
    }
}

impl Planner for SimplePlanner<'_> {
    fn compile(&self, req: &FactorRequest) -> Result<CompiledProgram, CodegenError> {
        if req.exprs.is_empty() {
            return Err(CompileError::EmptyRequest.into());
        }
        let started_at = Instant::now();
        let targets = self.lower_request(req)?;
        self.compile_targets(&targets, &req.opts, started_at)
    }

    fn compile_exprs(
        &self,
        targets: &[(String, Expr)],
        opts: &CompileOptions,
    ) -> Result<CompiledProgram, CodegenError> {
        self.compile_targets(targets, opts, Instant::now())
    }
}

fn default_output_name(idx: usize, expr: &Expr) -> String {
    format!("f{idx}_{}", expr.op().unwrap_or("expr"))
}
