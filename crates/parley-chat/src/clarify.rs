//! Clarification stage: decide whether a question needs follow-up questions.

use std::sync::Arc;

use tracing::info;

use crate::error::ChatError;
use crate::llm::TextGenerator;
use crate::prompts::{self, CLARIFICATION_SENTINEL};
use crate::types::ClarificationOutcome;

/// Parse clarifier output.
///
/// The trimmed output must equal the sentinel exactly to be `Clear`; any other
/// non-empty output is one question per non-blank line. Empty output is `Clear`.
pub fn parse_clarification(output: &str) -> ClarificationOutcome {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == CLARIFICATION_SENTINEL {
        return ClarificationOutcome::Clear;
    }
    let questions = trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    ClarificationOutcome::NeedsClarification(questions)
}

/// Stateless stage; repeated identical calls may yield different questions.
pub struct ClarificationStage {
    generator: Arc<dyn TextGenerator>,
}

impl ClarificationStage {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn clarify(
        &self,
        schema_text: &str,
        context_text: &str,
        question: &str,
    ) -> Result<ClarificationOutcome, ChatError> {
        let prompt = prompts::clarification(schema_text, context_text, question);
        let output = self.generator.generate(&prompt).await?;
        let outcome = parse_clarification(&output);
        match &outcome {
            ClarificationOutcome::Clear => info!("Question is clear"),
            ClarificationOutcome::NeedsClarification(questions) => {
                info!(count = questions.len(), "Question needs clarification")
            }
        }
        Ok(outcome)
    }
}
