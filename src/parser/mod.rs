use crate::config::PipelineConfig;
use crate::plan::{decode_plan, OperationPlan};
use crate::shared::errors::PipelineError;

pub mod completion;
pub mod fallback;
pub mod prompt;

pub use completion::{CompletionClient, CompletionError, HttpCompletionClient};
pub use fallback::{parse_fallback, ActivityDraft, FallbackCommand};
pub use prompt::{history_from_context, render_system_prompt, ConversationTurn, PromptContext};

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCommand {
    Plan(OperationPlan),
    Fallback(FallbackCommand),
}

pub fn parse_command(
    config: &PipelineConfig,
    completion: Option<&dyn CompletionClient>,
    context: &PromptContext<'_>,
    command: &str,
) -> Result<ParsedCommand, PipelineError> {
    let Some(client) = completion else {
        return parse_fallback(command).map(ParsedCommand::Fallback);
    };

    let system = render_system_prompt(config, context);
    match client.complete(&system, command) {
        Ok(text) => decode_plan(&text)
            .map(ParsedCommand::Plan)
            .map_err(|err| PipelineError::Parse {
                reason: err.to_string(),
                raw_output: err.raw_output().to_string(),
            }),
        Err(err) if err.is_unavailable() => parse_fallback(command).map(ParsedCommand::Fallback),
        Err(err) => Err(PipelineError::Parse {
            reason: err.to_string(),
            raw_output: String::new(),
        }),
    }
}
