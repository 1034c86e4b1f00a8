use crate::shared::errors::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityDraft {
    pub name: String,
    pub duration: Option<String>,
    pub cost_est: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackCommand {
    Create { activity: ActivityDraft },
    Optimize,
}

const CREATE_VERBS: &[&str] = &["create", "add"];
const FILLER_WORDS: &[&str] = &["a", "an", "the", "new", "activity", "task"];

pub fn parse_fallback(command: &str) -> Result<FallbackCommand, PipelineError> {
    let tokens = tokenize(command);
    if tokens.iter().any(|token| token == "optimize") {
        return Ok(FallbackCommand::Optimize);
    }

    for verb in CREATE_VERBS {
        if let Some(name) = capture_name(command, verb) {
            return Ok(FallbackCommand::Create {
                activity: ActivityDraft {
                    name,
                    duration: scan_duration(command),
                    cost_est: scan_cost(command),
                },
            });
        }
    }

    Err(PipelineError::UnsupportedCommand {
        command: command.trim().to_string(),
    })
}

fn tokenize(input: &str) -> Vec<String> {
    input
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '$' && c != '.')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn capture_name(command: &str, verb: &str) -> Option<String> {
    let lower = command.to_ascii_lowercase();
    let verb_at = find_word(&lower, verb)?;
    let mut rest = &command[verb_at + verb.len()..];

    loop {
        let trimmed = rest.trim_start();
        let word_len = trimmed
            .find(|c: char| c.is_whitespace() || c == ',' || c == ':')
            .unwrap_or(trimmed.len());
        let word = &trimmed[..word_len];
        if FILLER_WORDS.contains(&word.to_ascii_lowercase().as_str()) {
            rest = &trimmed[word_len..];
        } else {
            rest = trimmed;
            break;
        }
    }

    let end = rest.find([',', ':']).unwrap_or(rest.len());
    let name = rest[..end].trim();
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let mut search_from = 0;
    while let Some(relative) = haystack[search_from..].find(word) {
        let at = search_from + relative;
        let before_ok = at == 0
            || !haystack[..at]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric());
        let after = at + word.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric());
        if before_ok && after_ok {
            return Some(at);
        }
        search_from = at + word.len();
    }
    None
}

pub fn scan_duration(text: &str) -> Option<String> {
    let tokens = tokenize(text);
    for window in tokens.windows(2) {
        let [amount, unit] = window else { continue };
        let Ok(amount) = amount.parse::<u64>() else {
            continue;
        };
        let unit = match unit.as_str() {
            "day" | "days" => "day",
            "hour" | "hours" => "hour",
            "week" | "weeks" => "week",
            _ => continue,
        };
        let rendered = if amount == 1 {
            format!("{amount} {unit}")
        } else {
            format!("{amount} {unit}s")
        };
        return Some(rendered);
    }
    None
}

pub fn scan_cost(text: &str) -> Option<f64> {
    for token in text.split_whitespace() {
        let Some(raw) = token.strip_prefix('$') else {
            continue;
        };
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if cleaned.is_empty() {
            continue;
        }
        if let Ok(value) = cleaned.parse::<f64>() {
            return Some(value);
        }
    }
    None
}
