use crate::plan::OperationPlan;
use crate::shared::errors::PipelineError;
use crate::shared::ids::TableName;
use crate::store::scoped::ScopedStore;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub operation: &'static str,
    pub table: TableName,
    pub explanation: String,
    pub rows: Vec<Value>,
    pub records_affected: usize,
}

pub fn execute_plan(
    plan: &OperationPlan,
    store: &ScopedStore<'_>,
) -> Result<ExecutionOutcome, PipelineError> {
    let outcome = match plan {
        OperationPlan::Select { table, filters, .. } => store.select(table, filters)?,
        OperationPlan::Insert { table, data, .. } => store.insert(table, data)?,
        OperationPlan::Update {
            table,
            data,
            filters,
            ..
        } => store.update(table, data, filters)?,
        OperationPlan::Delete { table, filters, .. } => store.delete(table, filters)?,
    };
    Ok(ExecutionOutcome {
        operation: plan.verb(),
        table: plan.table().clone(),
        explanation: plan.explanation().to_string(),
        rows: outcome.rows,
        records_affected: outcome.records_affected,
    })
}
