use crate::activity::{optimize_project, OptimizeOutcome, ACTIVITY_TABLE, OPTIMIZE_NOTE};
use crate::audit::{AuditLogger, AuditRecord};
use crate::config::PipelineConfig;
use crate::parser::{
    history_from_context, parse_command, ActivityDraft, CompletionClient, FallbackCommand,
    ParsedCommand, PromptContext,
};
use crate::plan::{validate_plan, OperationPlan};
use crate::scope::{resolve_scope, Identity, IdentityProvider, TenantScope};
use crate::shared::errors::PipelineError;
use crate::shared::ids::{ProjectId, TableName, TenantId};
use crate::store::{execute_plan, Datastore, ExecutionOutcome, ScopedStore, TENANT_COLUMN};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub prompt: String,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn from_error(err: &PipelineError) -> Self {
        Self {
            status: err.status(),
            body: err.to_body(),
        }
    }
}

pub struct CommandPipeline<'a> {
    pub config: &'a PipelineConfig,
    pub store: &'a dyn Datastore,
    pub identity: &'a dyn IdentityProvider,
    pub completion: Option<&'a dyn CompletionClient>,
    pub state_root: Option<&'a Path>,
}

#[derive(Default)]
struct RunTrace {
    scope: Option<TenantScope>,
    plan: Option<Value>,
}

impl CommandPipeline<'_> {
    pub fn handle(&self, bearer_token: &str, request: &CommandRequest) -> ApiResponse {
        let identity = match self.identity.resolve(bearer_token) {
            Ok(identity) => identity,
            Err(err) => return ApiResponse::from_error(&err),
        };
        let mut trace = RunTrace::default();
        let result = self.run(&identity, request, &mut trace);
        self.audit(&identity, request, &trace, &result);
        match result {
            Ok(body) => ApiResponse::ok(body),
            Err(err) => ApiResponse::from_error(&err),
        }
    }

    fn run(
        &self,
        identity: &Identity,
        request: &CommandRequest,
        trace: &mut RunTrace,
    ) -> Result<Value, PipelineError> {
        let scope = resolve_scope(self.store, &identity.id)?;
        trace.scope = Some(scope.clone());

        let history = history_from_context(request.context.as_ref(), self.config.history_turns);
        let context = PromptContext {
            scope: &scope,
            project_id: request.project_id.as_ref(),
            history,
        };

        let plan = match parse_command(self.config, self.completion, &context, &request.prompt)? {
            ParsedCommand::Plan(plan) => plan,
            ParsedCommand::Fallback(FallbackCommand::Create { activity }) => {
                insert_plan_for_draft(activity, request.project_id.as_ref())?
            }
            ParsedCommand::Fallback(FallbackCommand::Optimize) => {
                let project = request.project_id.as_ref().ok_or_else(|| {
                    PipelineError::Validation("optimize requires a project id".to_string())
                })?;
                trace.plan = Some(json!({
                    "operation": "UPDATE",
                    "table": ACTIVITY_TABLE,
                    "optimize": true,
                }));
                let scoped = ScopedStore::new(self.store, &scope, self.config);
                let outcome = optimize_project(&scoped, project)?;
                return Ok(optimize_body(&outcome));
            }
        };

        trace.plan = Some(plan.to_value());
        validate_plan(&plan, self.config)?;

        let scoped = ScopedStore::new(self.store, &scope, self.config);
        let outcome = execute_plan(&plan, &scoped)?;
        Ok(success_body(&outcome))
    }

    fn audit(
        &self,
        identity: &Identity,
        request: &CommandRequest,
        trace: &RunTrace,
        result: &Result<Value, PipelineError>,
    ) {
        let scope = trace.scope.as_ref();
        let company = audit_company(trace);
        let mut context = json!({});
        if let Some(plan) = &trace.plan {
            context["plan"] = plan.clone();
        }
        if let Some(scope) = scope {
            context["scope"] = json!(scope.tenants());
        }
        let (summary, success) = match result {
            Ok(body) => (
                body.get("explanation")
                    .and_then(Value::as_str)
                    .unwrap_or("operation completed")
                    .to_string(),
                true,
            ),
            Err(err) => (err.to_string(), false),
        };
        let record = AuditRecord::new(
            identity.id.clone(),
            company,
            request.project_id.clone(),
            &request.prompt,
            &summary,
            context,
            success,
        );
        AuditLogger::new(self.store, &self.config.audit_table, self.state_root).append(&record);
    }
}

fn audit_company(trace: &RunTrace) -> Option<TenantId> {
    let scope = trace.scope.as_ref()?;
    if let Some(plan) = &trace.plan {
        for section in ["data", "filters"] {
            let claimed = plan
                .get(section)
                .and_then(|fields| fields.get(TENANT_COLUMN))
                .and_then(Value::as_str);
            if let Some(claimed) = claimed {
                if let Ok(tenant) = TenantId::parse(claimed) {
                    if scope.contains(&tenant) {
                        return Some(tenant);
                    }
                }
            }
        }
    }
    scope.tenants().first().cloned()
}

pub fn success_body(outcome: &ExecutionOutcome) -> Value {
    json!({
        "success": true,
        "operation": outcome.operation,
        "table": outcome.table,
        "explanation": outcome.explanation,
        "data": outcome.rows,
        "recordsAffected": outcome.records_affected,
    })
}

fn optimize_body(outcome: &OptimizeOutcome) -> Value {
    json!({
        "success": true,
        "operation": "UPDATE",
        "table": ACTIVITY_TABLE,
        "explanation": OPTIMIZE_NOTE,
        "data": outcome.rows,
        "recordsAffected": outcome.updated,
        "totalActivities": outcome.total,
        "failedUpdates": outcome.failed,
    })
}

fn insert_plan_for_draft(
    draft: ActivityDraft,
    project: Option<&ProjectId>,
) -> Result<OperationPlan, PipelineError> {
    let mut data = Map::new();
    data.insert("name".to_string(), Value::String(draft.name));
    if let Some(duration) = draft.duration {
        data.insert("duration".to_string(), Value::String(duration));
    }
    if let Some(cost) = draft.cost_est {
        if let Some(number) = serde_json::Number::from_f64(cost) {
            data.insert("cost_est".to_string(), Value::Number(number));
        }
    }
    if let Some(project) = project {
        data.insert(
            "project_id".to_string(),
            Value::String(project.to_string()),
        );
    }
    let table = TableName::parse(ACTIVITY_TABLE).map_err(PipelineError::Validation)?;
    Ok(OperationPlan::Insert {
        table,
        data,
        explanation: "created from keyword parsing; the model endpoint was unavailable"
            .to_string(),
        requires_confirmation: false,
    })
}
