use crate::shared::ids::TableName;
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub mod decode;
pub mod validate;

pub use decode::{decode_plan, DecodeError};
pub use validate::validate_plan;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawPlan")]
pub enum OperationPlan {
    Select {
        table: TableName,
        filters: Map<String, Value>,
        explanation: String,
    },
    Insert {
        table: TableName,
        data: Map<String, Value>,
        explanation: String,
        requires_confirmation: bool,
    },
    Update {
        table: TableName,
        data: Map<String, Value>,
        filters: Map<String, Value>,
        explanation: String,
        requires_confirmation: bool,
    },
    Delete {
        table: TableName,
        filters: Map<String, Value>,
        explanation: String,
        requires_confirmation: bool,
    },
}

impl OperationPlan {
    pub fn verb(&self) -> &'static str {
        match self {
            OperationPlan::Select { .. } => "SELECT",
            OperationPlan::Insert { .. } => "INSERT",
            OperationPlan::Update { .. } => "UPDATE",
            OperationPlan::Delete { .. } => "DELETE",
        }
    }

    pub fn table(&self) -> &TableName {
        match self {
            OperationPlan::Select { table, .. }
            | OperationPlan::Insert { table, .. }
            | OperationPlan::Update { table, .. }
            | OperationPlan::Delete { table, .. } => table,
        }
    }

    pub fn explanation(&self) -> &str {
        match self {
            OperationPlan::Select { explanation, .. }
            | OperationPlan::Insert { explanation, .. }
            | OperationPlan::Update { explanation, .. }
            | OperationPlan::Delete { explanation, .. } => explanation,
        }
    }

    pub fn requires_confirmation(&self) -> bool {
        match self {
            OperationPlan::Select { .. } => false,
            OperationPlan::Insert {
                requires_confirmation,
                ..
            }
            | OperationPlan::Update {
                requires_confirmation,
                ..
            }
            | OperationPlan::Delete {
                requires_confirmation,
                ..
            } => *requires_confirmation,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            OperationPlan::Select {
                table,
                filters,
                explanation,
            } => json!({
                "operation": "SELECT",
                "table": table,
                "filters": filters,
                "explanation": explanation,
            }),
            OperationPlan::Insert {
                table,
                data,
                explanation,
                requires_confirmation,
            } => json!({
                "operation": "INSERT",
                "table": table,
                "data": data,
                "explanation": explanation,
                "requiresConfirmation": requires_confirmation,
            }),
            OperationPlan::Update {
                table,
                data,
                filters,
                explanation,
                requires_confirmation,
            } => json!({
                "operation": "UPDATE",
                "table": table,
                "data": data,
                "filters": filters,
                "explanation": explanation,
                "requiresConfirmation": requires_confirmation,
            }),
            OperationPlan::Delete {
                table,
                filters,
                explanation,
                requires_confirmation,
            } => json!({
                "operation": "DELETE",
                "table": table,
                "filters": filters,
                "explanation": explanation,
                "requiresConfirmation": requires_confirmation,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    operation: String,
    table: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    filters: Option<Value>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(
        default,
        rename = "requiresConfirmation",
        alias = "requires_confirmation"
    )]
    requires_confirmation: Option<bool>,
}

fn object_field(field: &str, value: Option<Value>) -> Result<Map<String, Value>, String> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(format!(
            "`{field}` must be a JSON object, got {}",
            json_kind(&other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl TryFrom<RawPlan> for OperationPlan {
    type Error = String;

    fn try_from(raw: RawPlan) -> Result<Self, Self::Error> {
        let verb = raw.operation.trim().to_ascii_uppercase();
        let table = TableName::parse(raw.table.trim())?;
        let explanation = raw.explanation.unwrap_or_default();
        let requires_confirmation = raw.requires_confirmation.unwrap_or(false);
        match verb.as_str() {
            "SELECT" => Ok(OperationPlan::Select {
                table,
                filters: object_field("filters", raw.filters)?,
                explanation,
            }),
            "INSERT" => {
                let data = object_field("data", raw.data)?;
                if data.is_empty() {
                    return Err("INSERT requires a non-empty `data` object".to_string());
                }
                Ok(OperationPlan::Insert {
                    table,
                    data,
                    explanation,
                    requires_confirmation,
                })
            }
            "UPDATE" => {
                let data = object_field("data", raw.data)?;
                if data.is_empty() {
                    return Err("UPDATE requires a non-empty `data` object".to_string());
                }
                Ok(OperationPlan::Update {
                    table,
                    data,
                    filters: object_field("filters", raw.filters)?,
                    explanation,
                    requires_confirmation,
                })
            }
            "DELETE" => {
                let filters = object_field("filters", raw.filters)?;
                if filters.is_empty() {
                    return Err("DELETE requires a non-empty `filters` object".to_string());
                }
                Ok(OperationPlan::Delete {
                    table,
                    filters,
                    explanation,
                    requires_confirmation,
                })
            }
            other => Err(format!(
                "unknown operation `{other}`; expected SELECT, INSERT, UPDATE or DELETE"
            )),
        }
    }
}
