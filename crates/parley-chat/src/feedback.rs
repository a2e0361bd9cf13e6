//! Feedback stage: classify feedback and rewrite unsatisfied questions.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{info, warn};

use crate::error::ChatError;
use crate::llm::TextGenerator;
use crate::prompts::{self, LABEL_NOT_USEFUL, LABEL_USEFUL};
use crate::types::FeedbackVerdict;

static LEAD_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:new|reformulated|rewritten)?\s*question\s*:\s*")
        .expect("Invalid lead-in regex")
});

/// Map classifier output to a verdict.
///
/// Only output equal to the useful label (ignoring surrounding whitespace
/// and ASCII case) is `Useful`. Anything else, including prose around a
/// label, is `NotUseful`.
pub fn parse_verdict(output: &str) -> FeedbackVerdict {
    let label = output.trim();
    if label.eq_ignore_ascii_case(LABEL_USEFUL) {
        FeedbackVerdict::Useful
    } else {
        if !label.eq_ignore_ascii_case(LABEL_NOT_USEFUL) {
            warn!(output = %label, "Unrecognized classifier output, treating as not useful");
        }
        FeedbackVerdict::NotUseful
    }
}

/// Reduce generated text to a single bare question.
///
/// Takes the first non-blank line, drops a `New question:` style lead-in and
/// surrounding quotes. Returns `None` when nothing remains.
pub fn clean_question(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = LEAD_IN.replace(line, "");
    let line = line
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '`'))
        .trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

pub struct FeedbackStage {
    generator: Arc<dyn TextGenerator>,
}

impl FeedbackStage {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn classify_feedback(&self, feedback: &str) -> Result<FeedbackVerdict, ChatError> {
        let output = self
            .generator
            .generate(&prompts::classification(feedback))
            .await?;
        let verdict = parse_verdict(&output);
        info!(verdict = %verdict, "Feedback classified");
        Ok(verdict)
    }

    /// A new question built from the conversation and the feedback.
    pub async fn reformulate(&self, history: &str, feedback: &str) -> Result<String, ChatError> {
        let output = self
            .generator
            .generate(&prompts::reformulation(history, feedback))
            .await?;
        let question = clean_question(&output).ok_or_else(|| {
            ChatError::Generation("reformulation produced no question".to_string())
        })?;
        info!(len = question.len(), "Question reformulated");
        Ok(question)
    }
}
