use crate::audit::{AuditLogger, AuditRecord};
use crate::config::PipelineConfig;
use crate::parser::completion::CompletionClient;
use crate::pipeline::ApiResponse;
use crate::plan::decode::decode_json_payload;
use crate::scope::{resolve_scope, Identity, IdentityProvider, TenantScope};
use crate::shared::errors::PipelineError;
use crate::shared::ids::{ProjectId, TableName, TenantId};
use crate::store::{Datastore, ScopedStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const NODE_TABLE: &str = "network_nodes";
pub const DEPENDENCY_TABLE: &str = "network_dependencies";
pub const ADVISORY_TABLE: &str = "network_advisories";

pub const ADVISORY_NOTE: &str = "model-generated advisory; not algorithmically verified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkAction {
    ParsePrompt,
    OptimizeNetwork,
    SimulateChanges,
    GenerateSuggestions,
}

impl NetworkAction {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkAction::ParsePrompt => "parse_prompt",
            NetworkAction::OptimizeNetwork => "optimize_network",
            NetworkAction::SimulateChanges => "simulate_changes",
            NetworkAction::GenerateSuggestions => "generate_suggestions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub action: NetworkAction,
    pub project_id: ProjectId,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub nodes: Option<Vec<Value>>,
    #[serde(default)]
    pub dependencies: Option<Vec<Value>>,
    #[serde(default)]
    pub simulation_data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecedenceType {
    #[serde(alias = "FS", alias = "fs")]
    FinishToStart,
    #[serde(alias = "SS", alias = "ss")]
    StartToStart,
    #[serde(alias = "FF", alias = "ff")]
    FinishToFinish,
    #[serde(alias = "SF", alias = "sf")]
    StartToFinish,
}

impl PrecedenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            PrecedenceType::FinishToStart => "finish_to_start",
            PrecedenceType::StartToStart => "start_to_start",
            PrecedenceType::FinishToFinish => "finish_to_finish",
            PrecedenceType::StartToFinish => "start_to_finish",
        }
    }
}

fn default_precedence() -> PrecedenceType {
    PrecedenceType::FinishToStart
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskNode {
    pub label: String,
    pub name: String,
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskDependency {
    pub predecessor: String,
    pub successor: String,
    #[serde(default = "default_precedence")]
    pub precedence: PrecedenceType,
    #[serde(default)]
    pub lag_days: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct NetworkGraph {
    #[serde(default)]
    pub nodes: Vec<TaskNode>,
    #[serde(default)]
    pub dependencies: Vec<TaskDependency>,
}

impl NetworkGraph {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut labels = BTreeSet::new();
        for node in &self.nodes {
            if node.label.trim().is_empty() {
                return Err(PipelineError::Validation(
                    "graph node has an empty label".to_string(),
                ));
            }
            if !labels.insert(node.label.as_str()) {
                return Err(PipelineError::Validation(format!(
                    "duplicate graph node label `{}`",
                    node.label
                )));
            }
        }
        for dependency in &self.dependencies {
            for endpoint in [&dependency.predecessor, &dependency.successor] {
                if !labels.contains(endpoint.as_str()) {
                    return Err(PipelineError::Validation(format!(
                        "dependency references unknown node `{endpoint}`"
                    )));
                }
            }
            if dependency.predecessor == dependency.successor {
                return Err(PipelineError::Validation(format!(
                    "dependency loops node `{}` onto itself",
                    dependency.predecessor
                )));
            }
        }
        Ok(())
    }
}

pub struct NetworkOrchestrator<'a> {
    pub config: &'a PipelineConfig,
    pub store: &'a dyn Datastore,
    pub identity: &'a dyn IdentityProvider,
    pub completion: Option<&'a dyn CompletionClient>,
    pub state_root: Option<&'a Path>,
}

impl NetworkOrchestrator<'_> {
    pub fn handle(&self, bearer_token: &str, request: &NetworkRequest) -> ApiResponse {
        let identity = match self.identity.resolve(bearer_token) {
            Ok(identity) => identity,
            Err(err) => return ApiResponse::from_error(&err),
        };
        let result = self.run(&identity, request);
        self.audit(&identity, request, &result);
        match result {
            Ok(body) => ApiResponse::ok(body),
            Err(err) => ApiResponse::from_error(&err),
        }
    }

    fn run(&self, identity: &Identity, request: &NetworkRequest) -> Result<Value, PipelineError> {
        let scope = resolve_scope(self.store, &identity.id)?;
        let tenant = resolve_project_tenant(self.store, &scope, self.config, &request.project_id)?;
        let project_scope = TenantScope::single(tenant);
        let scoped = ScopedStore::new(self.store, &project_scope, self.config);

        match request.action {
            NetworkAction::ParsePrompt => {
                let message = request.message.as_deref().ok_or_else(|| {
                    PipelineError::Validation("parse_prompt requires a message".to_string())
                })?;
                let graph = self.parse_graph(message)?;
                graph.validate()?;
                let persisted = persist_graph(&scoped, &request.project_id, &graph)?;
                Ok(json!({
                    "success": true,
                    "action": request.action.as_str(),
                    "nodes": persisted.nodes,
                    "dependencies": persisted.dependencies,
                    "recordsAffected": persisted.records_affected,
                }))
            }
            NetworkAction::OptimizeNetwork
            | NetworkAction::SimulateChanges
            | NetworkAction::GenerateSuggestions => {
                let advisory = self.advisory(request, &scoped)?;
                Ok(json!({
                    "success": true,
                    "action": request.action.as_str(),
                    "advisory": advisory,
                    "explanation": ADVISORY_NOTE,
                }))
            }
        }
    }

    fn parse_graph(&self, message: &str) -> Result<NetworkGraph, PipelineError> {
        let client = self.completion.ok_or_else(|| PipelineError::Parse {
            reason: "graph parsing requires the model endpoint, which is not configured"
                .to_string(),
            raw_output: String::new(),
        })?;
        let system = render_graph_prompt();
        let text = client.complete(&system, message).map_err(|err| {
            PipelineError::Parse {
                reason: err.to_string(),
                raw_output: String::new(),
            }
        })?;
        decode_json_payload::<NetworkGraph>(&text).map_err(|err| PipelineError::Parse {
            reason: err.to_string(),
            raw_output: err.raw_output().to_string(),
        })
    }

    fn advisory(
        &self,
        request: &NetworkRequest,
        scoped: &ScopedStore<'_>,
    ) -> Result<Value, PipelineError> {
        let client = self.completion.ok_or_else(|| PipelineError::Parse {
            reason: format!(
                "{} requires the model endpoint, which is not configured",
                request.action.as_str()
            ),
            raw_output: String::new(),
        })?;

        let nodes = match &request.nodes {
            Some(nodes) => nodes.clone(),
            None => {
                let table = table_name(NODE_TABLE)?;
                scoped.select(&table, &project_filter(&request.project_id))?.rows
            }
        };
        let dependencies = match &request.dependencies {
            Some(dependencies) => dependencies.clone(),
            None => {
                let table = table_name(DEPENDENCY_TABLE)?;
                scoped.select(&table, &project_filter(&request.project_id))?.rows
            }
        };

        let mut user = json!({
            "nodes": nodes,
            "dependencies": dependencies,
        });
        if let Some(simulation) = &request.simulation_data {
            user["simulation"] = simulation.clone();
        }

        let system = render_advisory_prompt(request.action);
        let answer = client
            .complete(&system, &user.to_string())
            .map_err(|err| PipelineError::Execution(err.to_string()))?;

        let mut record = Map::new();
        record.insert(
            "project_id".to_string(),
            Value::String(request.project_id.to_string()),
        );
        record.insert(
            "action".to_string(),
            Value::String(request.action.as_str().to_string()),
        );
        record.insert("content".to_string(), Value::String(answer.clone()));
        record.insert(
            "created_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        let table = table_name(ADVISORY_TABLE)?;
        scoped.insert(&table, &record)?;

        Ok(Value::String(answer))
    }

    fn audit(
        &self,
        identity: &Identity,
        request: &NetworkRequest,
        result: &Result<Value, PipelineError>,
    ) {
        let (summary, success) = match result {
            Ok(_) => (format!("{} completed", request.action.as_str()), true),
            Err(err) => (err.to_string(), false),
        };
        let command_text = request
            .message
            .clone()
            .unwrap_or_else(|| request.action.as_str().to_string());
        let record = AuditRecord::new(
            identity.id.clone(),
            None,
            Some(request.project_id.clone()),
            &command_text,
            &summary,
            json!({"family": "network", "action": request.action.as_str()}),
            success,
        );
        AuditLogger::new(self.store, &self.config.audit_table, self.state_root).append(&record);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedGraph {
    pub nodes: Vec<Value>,
    pub dependencies: Vec<Value>,
    pub records_affected: usize,
}

pub fn persist_graph(
    scoped: &ScopedStore<'_>,
    project: &ProjectId,
    graph: &NetworkGraph,
) -> Result<PersistedGraph, PipelineError> {
    let node_table = table_name(NODE_TABLE)?;
    let dependency_table = table_name(DEPENDENCY_TABLE)?;

    let mut label_to_id = BTreeMap::new();
    let mut nodes = Vec::new();
    for node in &graph.nodes {
        let mut data = Map::new();
        data.insert("label".to_string(), Value::String(node.label.clone()));
        data.insert("name".to_string(), Value::String(node.name.clone()));
        if let Some(duration) = &node.duration {
            data.insert("duration".to_string(), Value::String(duration.clone()));
        }
        data.insert(
            "project_id".to_string(),
            Value::String(project.to_string()),
        );
        let outcome = scoped.insert(&node_table, &data)?;
        let row = outcome.rows.into_iter().next().ok_or_else(|| {
            PipelineError::Execution("node insert returned no row".to_string())
        })?;
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PipelineError::Execution("node insert returned no generated id".to_string())
            })?
            .to_string();
        label_to_id.insert(node.label.clone(), id);
        nodes.push(row);
    }

    let mut dependencies = Vec::new();
    for dependency in &graph.dependencies {
        let predecessor_id = label_to_id.get(&dependency.predecessor).ok_or_else(|| {
            PipelineError::Execution(format!(
                "no persisted node for label `{}`",
                dependency.predecessor
            ))
        })?;
        let successor_id = label_to_id.get(&dependency.successor).ok_or_else(|| {
            PipelineError::Execution(format!(
                "no persisted node for label `{}`",
                dependency.successor
            ))
        })?;
        let mut data = Map::new();
        data.insert(
            "predecessor_id".to_string(),
            Value::String(predecessor_id.clone()),
        );
        data.insert(
            "successor_id".to_string(),
            Value::String(successor_id.clone()),
        );
        data.insert(
            "precedence".to_string(),
            Value::String(dependency.precedence.as_str().to_string()),
        );
        data.insert("lag_days".to_string(), Value::from(dependency.lag_days));
        data.insert(
            "project_id".to_string(),
            Value::String(project.to_string()),
        );
        let outcome = scoped.insert(&dependency_table, &data)?;
        dependencies.extend(outcome.rows);
    }

    let records_affected = nodes.len() + dependencies.len();
    Ok(PersistedGraph {
        nodes,
        dependencies,
        records_affected,
    })
}

pub fn resolve_project_tenant(
    store: &dyn Datastore,
    scope: &TenantScope,
    config: &PipelineConfig,
    project: &ProjectId,
) -> Result<TenantId, PipelineError> {
    let table = table_name("projects")?;
    let scoped = ScopedStore::new(store, scope, config);
    let mut filters = Map::new();
    filters.insert("id".to_string(), Value::String(project.to_string()));
    let outcome = scoped.select(&table, &filters)?;
    let row = outcome.rows.first().ok_or_else(|| {
        PipelineError::Validation(format!("unknown project `{project}`"))
    })?;
    let tenant = row
        .get("company_id")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PipelineError::Execution("project row has no company id".to_string())
        })?;
    let tenant = TenantId::parse(tenant).map_err(PipelineError::Execution)?;
    if !scope.contains(&tenant) {
        return Err(PipelineError::Authorization(format!(
            "project `{project}` belongs to a company outside the caller's scope"
        )));
    }
    Ok(tenant)
}

fn table_name(name: &str) -> Result<TableName, PipelineError> {
    TableName::parse(name).map_err(PipelineError::Execution)
}

fn project_filter(project: &ProjectId) -> Map<String, Value> {
    let mut filters = Map::new();
    filters.insert(
        "project_id".to_string(),
        Value::String(project.to_string()),
    );
    filters
}

fn render_graph_prompt() -> String {
    "You are Skai, the project network assistant. Extract a task network from the user's \
     message.\n\n\
     Respond with only a JSON object, no prose and no markdown fences:\n\
     {\"nodes\": [{\"label\": \"A\", \"name\": \"...\", \"duration\": \"3 days\"}], \
     \"dependencies\": [{\"predecessor\": \"A\", \"successor\": \"B\", \
     \"precedence\": \"finish_to_start\", \"lag_days\": 0}]}\n\
     Precedence must be one of finish_to_start, start_to_start, finish_to_finish, \
     start_to_finish. Every dependency endpoint must match a node label."
        .to_string()
}

fn render_advisory_prompt(action: NetworkAction) -> String {
    let goal = match action {
        NetworkAction::OptimizeNetwork => "suggest an improved ordering for this task network",
        NetworkAction::SimulateChanges => "describe the likely impact of the proposed changes",
        NetworkAction::GenerateSuggestions => "suggest improvements to this task network",
        NetworkAction::ParsePrompt => "parse the task network",
    };
    format!(
        "You are Skai, the project network assistant. Given the task network in the user \
         message, {goal}. Your answer is stored as advisory text for a human to review."
    )
}
