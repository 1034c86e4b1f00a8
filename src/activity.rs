use crate::audit::{AuditLogger, AuditRecord};
use crate::config::PipelineConfig;
use crate::parser::completion::CompletionClient;
use crate::parser::fallback::{capture_name, scan_cost, scan_duration};
use crate::pipeline::{success_body, ApiResponse};
use crate::plan::decode::decode_json_payload;
use crate::scope::verify_membership;
use crate::shared::errors::PipelineError;
use crate::shared::ids::{ProjectId, TableName, TenantId, UserId};
use crate::store::{Datastore, ScopedStore};
use chrono::{Days, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;

pub const ACTIVITY_TABLE: &str = "activities";

pub const OPTIMIZE_NOTE: &str =
    "activities spaced sequentially at one-week offsets; advisory heuristic, not a schedule solver";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCommandRequest {
    pub command: String,
    pub user_id: UserId,
    pub company_id: TenantId,
    pub project_id: ProjectId,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ActivityPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub cost_est: Option<f64>,
    #[serde(default)]
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActivityInstruction {
    Create {
        activity: ActivityPayload,
    },
    Update {
        target: String,
        #[serde(default)]
        changes: ActivityPayload,
    },
    Delete {
        target: String,
    },
    Optimize,
}

pub fn convert_duration(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if let Ok(amount) = trimmed.parse::<u64>() {
        return Some(if amount == 1 {
            "1 day".to_string()
        } else {
            format!("{amount} days")
        });
    }
    scan_duration(trimmed)
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeOutcome {
    pub total: usize,
    pub updated: usize,
    pub failed: usize,
    pub rows: Vec<Value>,
}

pub fn optimize_project(
    scoped: &ScopedStore<'_>,
    project: &ProjectId,
) -> Result<OptimizeOutcome, PipelineError> {
    let table = activity_table()?;
    let mut project_filter = Map::new();
    project_filter.insert(
        "project_id".to_string(),
        Value::String(project.to_string()),
    );
    let mut activities = scoped.select(&table, &project_filter)?.rows;
    activities.sort_by(|a, b| {
        let a_id = a.get("id").and_then(Value::as_str).unwrap_or_default();
        let b_id = b.get("id").and_then(Value::as_str).unwrap_or_default();
        a_id.cmp(b_id)
    });

    let today = Utc::now().date_naive();
    let total = activities.len();
    let mut updated = 0;
    let mut failed = 0;
    let mut rows = Vec::new();
    for (index, activity) in activities.iter().enumerate() {
        let Some(id) = activity.get("id").and_then(Value::as_str) else {
            failed += 1;
            continue;
        };
        let start = today
            .checked_add_days(Days::new(7 * index as u64))
            .ok_or_else(|| PipelineError::Execution("start date out of range".to_string()))?;
        let mut data = Map::new();
        data.insert(
            "start_date".to_string(),
            Value::String(start.format("%Y-%m-%d").to_string()),
        );
        let mut id_filter = Map::new();
        id_filter.insert("id".to_string(), Value::String(id.to_string()));
        match scoped.update(&table, &data, &id_filter) {
            Ok(outcome) => {
                updated += outcome.records_affected;
                rows.extend(outcome.rows);
            }
            Err(_) => failed += 1,
        }
    }

    Ok(OptimizeOutcome {
        total,
        updated,
        failed,
        rows,
    })
}

pub struct ActivityProcessor<'a> {
    pub config: &'a PipelineConfig,
    pub store: &'a dyn Datastore,
    pub completion: Option<&'a dyn CompletionClient>,
    pub state_root: Option<&'a Path>,
}

impl ActivityProcessor<'_> {
    pub fn handle(&self, request: &ActivityCommandRequest) -> ApiResponse {
        let result = self.run(request);
        self.audit(request, &result);
        match result {
            Ok(body) => ApiResponse::ok(body),
            Err(err) => ApiResponse::from_error(&err),
        }
    }

    fn run(&self, request: &ActivityCommandRequest) -> Result<Value, PipelineError> {
        let scope = verify_membership(self.store, &request.user_id, &request.company_id)?;
        let instruction = self.parse(request)?;
        let scoped = ScopedStore::new(self.store, &scope, self.config);
        let table = activity_table()?;

        match instruction {
            ActivityInstruction::Create { activity } => {
                let name = activity.name.clone().ok_or_else(|| {
                    PipelineError::Validation("create requires an activity name".to_string())
                })?;
                let mut data = Map::new();
                data.insert("name".to_string(), Value::String(name));
                if let Some(raw) = &activity.duration {
                    let interval = convert_duration(raw).ok_or_else(|| {
                        PipelineError::Validation(format!("unrecognized duration `{raw}`"))
                    })?;
                    data.insert("duration".to_string(), Value::String(interval));
                }
                if let Some(cost) = activity.cost_est {
                    if let Some(number) = serde_json::Number::from_f64(cost) {
                        data.insert("cost_est".to_string(), Value::Number(number));
                    }
                }
                if let Some(start) = &activity.start_date {
                    data.insert("start_date".to_string(), Value::String(start.clone()));
                }
                data.insert(
                    "project_id".to_string(),
                    Value::String(request.project_id.to_string()),
                );
                let outcome = scoped.insert(&table, &data)?;
                envelope("INSERT", "activity created", outcome.rows, outcome.records_affected)
            }
            ActivityInstruction::Update { target, changes } => {
                let mut data = Map::new();
                if let Some(raw) = &changes.duration {
                    let interval = convert_duration(raw).ok_or_else(|| {
                        PipelineError::Validation(format!("unrecognized duration `{raw}`"))
                    })?;
                    data.insert("duration".to_string(), Value::String(interval));
                }
                if let Some(cost) = changes.cost_est {
                    if let Some(number) = serde_json::Number::from_f64(cost) {
                        data.insert("cost_est".to_string(), Value::Number(number));
                    }
                }
                if let Some(start) = &changes.start_date {
                    data.insert("start_date".to_string(), Value::String(start.clone()));
                }
                if let Some(name) = &changes.name {
                    data.insert("name".to_string(), Value::String(name.clone()));
                }
                if data.is_empty() {
                    return Err(PipelineError::Validation(
                        "update names no recognized changes".to_string(),
                    ));
                }
                let filters = target_filters(&target, &request.project_id);
                let outcome = scoped.update(&table, &data, &filters)?;
                envelope("UPDATE", "activity updated", outcome.rows, outcome.records_affected)
            }
            ActivityInstruction::Delete { target } => {
                let filters = target_filters(&target, &request.project_id);
                let outcome = scoped.delete(&table, &filters)?;
                envelope("DELETE", "activity deleted", outcome.rows, outcome.records_affected)
            }
            ActivityInstruction::Optimize => {
                let outcome = optimize_project(&scoped, &request.project_id)?;
                Ok(json!({
                    "success": true,
                    "operation": "UPDATE",
                    "table": ACTIVITY_TABLE,
                    "explanation": OPTIMIZE_NOTE,
                    "data": outcome.rows,
                    "recordsAffected": outcome.updated,
                    "totalActivities": outcome.total,
                    "failedUpdates": outcome.failed,
                }))
            }
        }
    }

    fn parse(&self, request: &ActivityCommandRequest) -> Result<ActivityInstruction, PipelineError> {
        let Some(client) = self.completion else {
            return parse_activity_command(&request.command);
        };
        let system = render_activity_prompt(&request.project_id);
        match client.complete(&system, &request.command) {
            Ok(text) => {
                decode_json_payload::<ActivityInstruction>(&text).map_err(|err| {
                    PipelineError::Parse {
                        reason: err.to_string(),
                        raw_output: err.raw_output().to_string(),
                    }
                })
            }
            Err(err) if err.is_unavailable() => parse_activity_command(&request.command),
            Err(err) => Err(PipelineError::Parse {
                reason: err.to_string(),
                raw_output: String::new(),
            }),
        }
    }

    fn audit(&self, request: &ActivityCommandRequest, result: &Result<Value, PipelineError>) {
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
            request.user_id.clone(),
            Some(request.company_id.clone()),
            Some(request.project_id.clone()),
            &request.command,
            &summary,
            json!({"family": "activity"}),
            success,
        );
        AuditLogger::new(self.store, &self.config.audit_table, self.state_root).append(&record);
    }
}

fn envelope(
    operation: &'static str,
    explanation: &str,
    rows: Vec<Value>,
    records_affected: usize,
) -> Result<Value, PipelineError> {
    let outcome = crate::store::ExecutionOutcome {
        operation,
        table: activity_table()?,
        explanation: explanation.to_string(),
        rows,
        records_affected,
    };
    Ok(success_body(&outcome))
}

fn activity_table() -> Result<TableName, PipelineError> {
    TableName::parse(ACTIVITY_TABLE).map_err(PipelineError::Execution)
}

fn target_filters(target: &str, project: &ProjectId) -> Map<String, Value> {
    let mut filters = Map::new();
    filters.insert("name".to_string(), Value::String(target.to_string()));
    filters.insert(
        "project_id".to_string(),
        Value::String(project.to_string()),
    );
    filters
}

pub fn parse_activity_command(command: &str) -> Result<ActivityInstruction, PipelineError> {
    let lower = command.to_ascii_lowercase();
    let has_word = |word: &str| {
        lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| token == word)
    };

    if has_word("optimize") {
        return Ok(ActivityInstruction::Optimize);
    }

    for verb in ["delete", "remove"] {
        if let Some(target) = capture_name(command, verb) {
            return Ok(ActivityInstruction::Delete { target });
        }
    }

    for verb in ["update", "change", "set"] {
        if let Some(target) = capture_name(command, verb) {
            let changes = ActivityPayload {
                name: None,
                duration: scan_duration(command),
                cost_est: scan_cost(command),
                start_date: None,
            };
            if changes.duration.is_none() && changes.cost_est.is_none() {
                break;
            }
            return Ok(ActivityInstruction::Update { target, changes });
        }
    }

    for verb in ["create", "add"] {
        if let Some(name) = capture_name(command, verb) {
            return Ok(ActivityInstruction::Create {
                activity: ActivityPayload {
                    name: Some(name),
                    duration: scan_duration(command),
                    cost_est: scan_cost(command),
                    start_date: None,
                },
            });
        }
    }

    Err(PipelineError::UnsupportedCommand {
        command: command.trim().to_string(),
    })
}

fn render_activity_prompt(project: &ProjectId) -> String {
    format!(
        "You are Skai, the project activity assistant for project {project}. Translate the \
         user's instruction into exactly one activity operation.\n\n\
         Respond with only a JSON object, no prose and no markdown fences, in one of these \
         shapes:\n\
         {{\"action\": \"create\", \"activity\": {{\"name\": \"...\", \"duration\": \"3 days\", \
         \"cost_est\": 500, \"start_date\": \"2026-01-01\"}}}}\n\
         {{\"action\": \"update\", \"target\": \"<activity name>\", \"changes\": {{...}}}}\n\
         {{\"action\": \"delete\", \"target\": \"<activity name>\"}}\n\
         {{\"action\": \"optimize\"}}\n\
         Durations are phrases like \"3 days\", \"2 hours\" or \"1 week\"."
    )
}
