use crate::compile::Planner;
use crate::plan::{CompiledProgram, Statement};
use crate::types::FactorRequest;
use crate::SimplePlanner;


fn moving_average_request() -> FactorRequest {
    FactorRequest::named([
        ("MA_10", "ts_mean(CLOSE, 10)"),
        ("MA_40", "ts_mean(ts_mean(CLOSE, 5), 40)"),
    ])
}

fn shared_subexpression_request() -> FactorRequest {
    FactorRequest::named([
        ("A", "ts_mean(CLOSE, 5) + cs_rank(CLOSE)"),
        ("B", "ts_mean(CLOSE, 5) * 2"),
    ])
}

fn compile_request(request: &FactorRequest) -> CompiledProgram {
    SimplePlanner::default()
        .compile(request)
        .expect("compile should succeed")
}

fn alias_names(program: &CompiledProgram) -> Vec<&str> {
    program
        .aliases()
        .filter_map(|statement| match statement {
            Statement::Alias { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

fn assigned_targets(program: &CompiledProgram) -> Vec<&str> {
    program
        .assignments()
        .filter_map(|statement| match statement {
            Statement::Assign { target, .. } => Some(target.as_str()),
            _ => None,
        })
        .collect()
}

/// Every operand is scheduled no later than its consumer, and strictly
/// earlier when the two need different partitions.
fn assert_dependency_order(program: &CompiledProgram) {
    for node in program.graph.op_nodes() {
        let stage = program
            .schedule
            .stage_of(node.id)
            .expect("operator node should be scheduled");
        for arg in node.args() {
            let Some(operand_stage) = program.schedule.stage_of(*arg) else {
                continue;
            };
            assert!(operand_stage <= stage, "{arg} scheduled after {}", node.id);
            let consumer = program.schedule.stages[stage].partition;
            let producer = program.schedule.stages[operand_stage].partition;
            if consumer != producer {
                assert!(operand_stage < stage, "{arg} shares a stage with {}", node.id);
            }
        }
    }
}
