use crate::plan::OperationPlan;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("model output was empty")]
    Empty { raw_output: String },
    #[error("model output is not valid json: {reason}")]
    Json { reason: String, raw_output: String },
    #[error("model output does not match the expected shape: {reason}")]
    Shape { reason: String, raw_output: String },
}

impl DecodeError {
    pub fn raw_output(&self) -> &str {
        match self {
            DecodeError::Empty { raw_output }
            | DecodeError::Json { raw_output, .. }
            | DecodeError::Shape { raw_output, .. } => raw_output,
        }
    }
}

pub fn decode_plan(raw_output: &str) -> Result<OperationPlan, DecodeError> {
    decode_json_payload(raw_output)
}

pub fn decode_json_payload<T: DeserializeOwned>(raw_output: &str) -> Result<T, DecodeError> {
    let trimmed = raw_output.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty {
            raw_output: raw_output.to_string(),
        });
    }

    let candidate = strip_code_fence(trimmed).unwrap_or_else(|| trimmed.to_string());
    let value = match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => value,
        Err(first_err) => match extract_balanced_object(&candidate) {
            Some(object) => {
                serde_json::from_str::<Value>(&object).map_err(|err| DecodeError::Json {
                    reason: err.to_string(),
                    raw_output: raw_output.to_string(),
                })?
            }
            None => {
                return Err(DecodeError::Json {
                    reason: first_err.to_string(),
                    raw_output: raw_output.to_string(),
                })
            }
        },
    };

    serde_json::from_value(value).map_err(|err| DecodeError::Shape {
        reason: err.to_string(),
        raw_output: raw_output.to_string(),
    })
}

fn strip_code_fence(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return None;
    }
    let after_fence = &trimmed[3..];
    let body_start = after_fence.find('\n')?;
    let body = &after_fence[body_start + 1..];
    let closing = body.rfind("```")?;
    Some(body[..closing].trim().to_string())
}

fn extract_balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
