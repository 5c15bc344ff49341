use super::{py_str, Dialect, Operand, PrinterRegistry};
use crate::error::PrintError;
use crate::graph::{Binding, ExprGraph, Node, NodeId, NodeKind};
use crate::plan::Statement;
use crate::schedule::{Partition, Schedule, Stage};
use crate::types::CompileOptions;
use tracing::trace;

const INDENT: &str = "    ";

/// Column name holding the value of an operator node.
pub fn synthetic_name(node: &Node) -> String {
    format!("_n{}_{}", node.id.index(), node.op().unwrap_or("leaf"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmittedProgram {
    pub statements: Vec<Statement>,
    /// Stage functions and driver lines, ready to hand to a template.
    pub source: String,
}

/// Renders every scheduled node, the stage directives, the output aliases
/// and the optional drop of intermediates.
///
/// Nothing is returned unless every node printed.
pub fn emit_program(
    graph: &ExprGraph,
    schedule: &Schedule,
    bindings: &[Binding],
    registry: &PrinterRegistry,
    opts: &CompileOptions,
) -> Result<EmittedProgram, PrintError> {
    let emitter = Emitter {
        graph,
        registry,
        opts,
        dialect: opts.dialect,
    };
    let mut statements = Vec::with_capacity(schedule.node_count() + schedule.len() + bindings.len() + 1);
    let mut blocks: Vec<String> = Vec::with_capacity(schedule.len() + 1);

    for stage in &schedule.stages {
        let function = stage_function_name(stage);
        let mut body = format!("def {function}(df):\n");
        for id in &stage.nodes {
            let node = emitter.node(*id)?;
            let statement = emitter.assign(stage.index, node)?;
            body.push_str(INDENT);
            body.push_str(statement.code());
            body.push('\n');
            statements.push(statement);
        }
        body.push_str(INDENT);
        body.push_str("return df\n");
        blocks.push(body);

        let code = emitter.directive(stage.partition, &function)?;
        trace!(stage = stage.index, partition = %stage.partition, %code, "stage directive");
        statements.push(Statement::Partition {
            stage: stage.index,
            function,
            partition: stage.partition,
            code,
        });
    }

    for binding in bindings {
        let root = emitter.node(binding.root)?;
        let source = synthetic_name(root);
        statements.push(Statement::Alias {
            code: emitter.alias(&binding.name, &source),
            name: binding.name.clone(),
            source,
        });
    }

    if opts.drop_intermediates {
        let columns = schedule
            .stages
            .iter()
            .flat_map(|stage| stage.nodes.iter())
            .map(|id| emitter.node(*id).map(synthetic_name))
            .collect::<Result<Vec<_>, _>>()?;
        if !columns.is_empty() {
            statements.push(Statement::Drop {
                code: emitter.drop(&columns),
                columns,
            });
        }
    }

    let driver: Vec<&str> = statements
        .iter()
        .filter(|statement| !matches!(statement, Statement::Assign { .. }))
        .map(Statement::code)
        .collect();
    blocks.push(driver.join("\n") + "\n");
    Ok(EmittedProgram {
        statements,
        source: blocks.join("\n\n"),
    })
}

fn stage_function_name(stage: &Stage) -> String {
    format!(
        "stage_{}_{}",
        stage.index,
        stage.partition.kind().as_str().replace('-', "_")
    )
}

struct Emitter<'a> {
    graph: &'a ExprGraph,
    registry: &'a PrinterRegistry,
    opts: &'a CompileOptions,
    dialect: Dialect,
}

impl<'a> Emitter<'a> {
    fn node(&self, id: NodeId) -> Result<&'a Node, PrintError> {
        self.graph.node(id).ok_or(PrintError::UnknownNode { id })
    }

    fn operand(&self, id: NodeId) -> Result<Operand, PrintError> {
        let node = self.node(id)?;
        Ok(match &node.kind {
            NodeKind::Symbol(name) => Operand::series(self.dialect.column(name)),
            NodeKind::Literal(v) => Operand::literal(*v),
            NodeKind::Op { .. } => Operand::series(self.dialect.column(&synthetic_name(node))),
        })
    }

    fn column_name(&self, id: NodeId) -> Result<String, PrintError> {
        let node = self.node(id)?;
        Ok(match &node.kind {
            NodeKind::Symbol(name) => name.clone(),
            _ => synthetic_name(node),
        })
    }

    fn assign(&self, stage: usize, node: &Node) -> Result<Statement, PrintError> {
        let op = node.op().unwrap_or_default();
        let operands = node
            .args()
            .iter()
            .map(|arg| self.operand(*arg))
            .collect::<Result<Vec<_>, _>>()?;
        let printed = self.registry.print(op, self.dialect, &operands)?;
        let target = synthetic_name(node);
        let code = match self.dialect {
            Dialect::Polars => format!("df = df.with_columns({target}={})", printed.text),
            Dialect::Pandas => format!("df[{}] = {}", py_str(&target), printed.text),
        };
        Ok(Statement::Assign {
            stage,
            node: node.id,
            target,
            code,
        })
    }

    fn directive(&self, partition: Partition, function: &str) -> Result<String, PrintError> {
        let date = py_str(&self.opts.date_column);
        let asset = py_str(&self.opts.asset_column);
        let (sort_keys, group_keys) = match partition {
            Partition::None => return Ok(format!("df = {function}(df)")),
            Partition::ByEntity => (format!("[{asset}, {date}]"), asset.clone()),
            Partition::ByTime => (format!("[{date}, {asset}]"), date.clone()),
            Partition::ByGroup(key) => {
                let key = py_str(&self.column_name(key)?);
                (
                    format!("[{date}, {key}, {asset}]"),
                    format!("[{date}, {key}]"),
                )
            }
        };
        Ok(match self.dialect {
            Dialect::Polars => format!(
                "df = df.sort({sort_keys}).group_by({group_keys}, maintain_order=True).map_groups({function})"
            ),
            Dialect::Pandas => format!(
                "df = df.sort_values({sort_keys}).groupby({group_keys}, group_keys=False).apply({function})"
            ),
        })
    }

    fn alias(&self, name: &str, source: &str) -> String {
        match self.dialect {
            Dialect::Polars => format!(
                "df = df.with_columns({}.alias({}))",
                self.dialect.column(source),
                py_str(name)
            ),
            Dialect::Pandas => format!("df[{}] = {}", py_str(name), self.dialect.column(source)),
        }
    }

    fn drop(&self, columns: &[String]) -> String {
        let list: Vec<String> = columns.iter().map(|column| py_str(column)).collect();
        match self.dialect {
            Dialect::Polars => format!("df = df.drop([{}])", list.join(", ")),
            Dialect::Pandas => format!("df = df.drop(columns=[{}])", list.join(", ")),
        }
    }
}
