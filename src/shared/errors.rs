use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("authorization failed: {0}")]
    Authorization(String),
    #[error("model output could not be parsed into an operation plan: {reason}")]
    Parse { reason: String, raw_output: String },
    #[error("unsupported command `{command}`; rephrase as a create or optimize instruction")]
    UnsupportedCommand { command: String },
    #[error("plan validation failed: {0}")]
    Validation(String),
    #[error("operation failed: {0}")]
    Execution(String),
}

impl PipelineError {
    pub fn status(&self) -> u16 {
        match self {
            PipelineError::Authentication(_) => 401,
            PipelineError::Authorization(_) => 403,
            PipelineError::Parse { .. } => 422,
            PipelineError::UnsupportedCommand { .. } => 422,
            PipelineError::Validation(_) => 400,
            PipelineError::Execution(_) => 500,
        }
    }

    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.to_string(),
        });
        if let PipelineError::Parse { raw_output, .. } = self {
            if !raw_output.is_empty() {
                body["details"] = json!({ "raw_output": raw_output });
            }
        }
        body
    }
}
