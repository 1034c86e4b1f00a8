use crate::config::PipelineConfig;
use crate::scope::TenantScope;
use crate::shared::ids::ProjectId;
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

pub struct PromptContext<'a> {
    pub scope: &'a TenantScope,
    pub project_id: Option<&'a ProjectId>,
    pub history: Vec<ConversationTurn>,
}

pub fn history_from_context(context: Option<&Value>, max_turns: usize) -> Vec<ConversationTurn> {
    let Some(turns) = context
        .and_then(|context| context.get("history"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    let mut history: Vec<ConversationTurn> = turns
        .iter()
        .filter_map(|turn| serde_json::from_value(turn.clone()).ok())
        .collect();
    if history.len() > max_turns {
        history.drain(..history.len() - max_turns);
    }
    history
}

pub fn render_system_prompt(config: &PipelineConfig, context: &PromptContext<'_>) -> String {
    let tables = config
        .tables
        .iter()
        .map(|table| table.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let tenants = context
        .scope
        .tenants()
        .iter()
        .map(|tenant| tenant.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = String::new();
    prompt.push_str(
        "You are Skai, the project data assistant. Translate the user's instruction \
         into exactly one database operation.\n\n",
    );
    let _ = writeln!(prompt, "Allowed tables: {tables}");
    prompt.push_str("Allowed operations: SELECT, INSERT, UPDATE, DELETE\n\n");
    let _ = writeln!(prompt, "The caller's company id(s): {tenants}");
    match context.project_id {
        Some(project) => {
            let _ = writeln!(prompt, "The caller's current project id: {project}");
        }
        None => prompt.push_str("The caller has no current project.\n"),
    }
    prompt.push_str(
        "Use these ids as default values for company_id and project_id fields and \
         filters unless the instruction names others.\n\n",
    );
    prompt.push_str(
        "Respond with only a JSON object of this shape, no prose and no markdown fences:\n\
         {\"operation\": \"SELECT|INSERT|UPDATE|DELETE\", \"table\": \"...\", \
         \"data\": {...}, \"filters\": {...}, \"explanation\": \"...\", \
         \"requiresConfirmation\": false}\n\
         Omit \"data\" for SELECT and DELETE. DELETE must include non-empty \
         \"filters\". Set \"requiresConfirmation\" to true for destructive \
         operations.\n",
    );

    if !context.history.is_empty() {
        prompt.push_str("\nRecent conversation turns, oldest first:\n");
        for turn in &context.history {
            let _ = writeln!(prompt, "- {}: {}", turn.role, turn.content);
        }
    }
    prompt
}
