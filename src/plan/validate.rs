use crate::config::PipelineConfig;
use crate::plan::OperationPlan;
use crate::shared::errors::PipelineError;

pub fn validate_plan(plan: &OperationPlan, config: &PipelineConfig) -> Result<(), PipelineError> {
    let table = plan.table();
    if !config.allows_table(table) {
        return Err(PipelineError::Validation(format!(
            "table `{table}` is not in the allow-list"
        )));
    }
    Ok(())
}
