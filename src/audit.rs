use crate::shared::fingerprint::{audit_record_id, invocation_fingerprint};
use crate::shared::ids::{ProjectId, TableName, TenantId, UserId};
use crate::store::Datastore;
use chrono::Utc;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write as _;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub record_id: String,
    pub user_id: UserId,
    pub company_id: Option<TenantId>,
    pub project_id: Option<ProjectId>,
    pub command_text: String,
    pub response_summary: String,
    pub context_data: Value,
    pub success: bool,
    pub created_at: String,
}

impl AuditRecord {
    pub fn new(
        user_id: UserId,
        company_id: Option<TenantId>,
        project_id: Option<ProjectId>,
        command_text: &str,
        response_summary: &str,
        mut context_data: Value,
        success: bool,
    ) -> Self {
        let now = Utc::now();
        let record_id = audit_record_id(now.timestamp())
            .unwrap_or_else(|_| format!("aud-{}", now.timestamp()));
        let fingerprint = invocation_fingerprint(user_id.as_str(), command_text);
        if let Value::Object(map) = &mut context_data {
            map.insert("fingerprint".to_string(), Value::String(fingerprint));
        }
        Self {
            record_id,
            user_id,
            company_id,
            project_id,
            command_text: command_text.to_string(),
            response_summary: response_summary.to_string(),
            context_data,
            success,
            created_at: now.to_rfc3339(),
        }
    }

    fn to_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("id".to_string(), Value::String(self.record_id.clone()));
        data.insert(
            "user_id".to_string(),
            Value::String(self.user_id.to_string()),
        );
        if let Some(company) = &self.company_id {
            data.insert("company_id".to_string(), Value::String(company.to_string()));
        }
        if let Some(project) = &self.project_id {
            data.insert("project_id".to_string(), Value::String(project.to_string()));
        }
        data.insert(
            "command_text".to_string(),
            Value::String(self.command_text.clone()),
        );
        data.insert(
            "response_summary".to_string(),
            Value::String(self.response_summary.clone()),
        );
        data.insert("context_data".to_string(), self.context_data.clone());
        data.insert("success".to_string(), Value::Bool(self.success));
        data.insert(
            "created_at".to_string(),
            Value::String(self.created_at.clone()),
        );
        data
    }
}

pub struct AuditLogger<'a> {
    store: &'a dyn Datastore,
    table: &'a TableName,
    state_root: Option<&'a Path>,
}

impl<'a> AuditLogger<'a> {
    pub fn new(store: &'a dyn Datastore, table: &'a TableName, state_root: Option<&'a Path>) -> Self {
        Self {
            store,
            table,
            state_root,
        }
    }

    pub fn append(&self, record: &AuditRecord) {
        if let Err(err) = self.store.insert(self.table, &record.to_data()) {
            if let Some(state_root) = self.state_root {
                let _ = append_operator_log_line(
                    state_root,
                    &format!(
                        "audit insert failed for record {}: {err}",
                        record.record_id
                    ),
                );
            }
        }
    }
}

fn append_operator_log_line(state_root: &Path, line: &str) -> std::io::Result<()> {
    let path = state_root.join("logs/pipeline.log");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{line}")
}
