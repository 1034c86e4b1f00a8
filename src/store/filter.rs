use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Filter {
    Eq { column: String, value: Value },
    In { column: String, values: Vec<Value> },
}

impl Filter {
    pub fn eq(column: &str, value: Value) -> Self {
        Filter::Eq {
            column: column.to_string(),
            value,
        }
    }

    pub fn within(column: &str, values: Vec<Value>) -> Self {
        Filter::In {
            column: column.to_string(),
            values,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. } | Filter::In { column, .. } => column,
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        let Some(actual) = row.get(self.column()) else {
            return false;
        };
        match self {
            Filter::Eq { value, .. } => actual == value,
            Filter::In { values, .. } => values.iter().any(|value| actual == value),
        }
    }
}

pub fn matches_all(filters: &[Filter], row: &Value) -> bool {
    filters.iter().all(|filter| filter.matches(row))
}

pub fn from_plan_filters(filters: &Map<String, Value>) -> Vec<Filter> {
    filters
        .iter()
        .map(|(column, value)| match value {
            Value::Array(values) => Filter::within(column, values.clone()),
            other => Filter::eq(column, other.clone()),
        })
        .collect()
}
