#![allow(dead_code)]

use factor_codegen::{
    CompileOptions, CompiledProgram, Dialect, FactorRequest, Planner, SimplePlanner, Statement,
};

pub fn compile(pairs: &[(&str, &str)]) -> CompiledProgram {
    compile_with(pairs, CompileOptions::default())
}

pub fn compile_with(pairs: &[(&str, &str)], opts: CompileOptions) -> CompiledProgram {
    let request = FactorRequest::named(pairs.iter().copied()).with_options(opts);
    SimplePlanner::default()
        .compile(&request)
        .expect("compile should succeed")
}

pub fn pandas() -> CompileOptions {
    CompileOptions::default().with_dialect(Dialect::Pandas)
}

pub fn codes(program: &CompiledProgram) -> Vec<&str> {
    program.statements.iter().map(Statement::code).collect()
}

pub fn alias_names(program: &CompiledProgram) -> Vec<String> {
    program
        .aliases()
        .filter_map(|statement| match statement {
            Statement::Alias { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// Asserts the stage ordering contract on a compiled program.
pub fn assert_stage_order(program: &CompiledProgram) {
    let schedule = &program.schedule;
    assert_eq!(schedule.node_count(), program.graph.op_nodes().count());
    for node in program.graph.op_nodes() {
        let stage = schedule.stage_of(node.id).expect("every op node is scheduled");
        for arg in node.args() {
            if let Some(operand_stage) = schedule.stage_of(*arg) {
                assert!(operand_stage <= stage);
                if schedule.stages[operand_stage].partition != schedule.stages[stage].partition {
                    assert!(operand_stage < stage);
                }
            }
        }
    }
    for (idx, stage) in schedule.stages.iter().enumerate() {
        assert_eq!(stage.index, idx);
        assert!(!stage.nodes.is_empty());
    }
}
