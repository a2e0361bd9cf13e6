//! Stage outcomes and the request/response shapes of the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of the clarification stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClarificationOutcome {
    /// Questions to put to the user, in order.
    NeedsClarification(Vec<String>),
    /// The question can be answered as asked.
    Clear,
}

/// Result of the query execution stage after the correction retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Success(String),
    Failure(String),
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Success(_))
    }
}

/// Verdict of the feedback classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackVerdict {
    Useful,
    NotUseful,
}

impl fmt::Display for FeedbackVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackVerdict::Useful => write!(f, "useful"),
            FeedbackVerdict::NotUseful => write!(f, "not_useful"),
        }
    }
}

/// Response to a submitted question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub clarification_needed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuestionResponse {
    pub fn clarification(questions: Vec<String>) -> Self {
        Self {
            clarification_needed: true,
            questions: Some(questions),
            result: None,
            explanation: None,
        }
    }

    pub fn answered(result: String, explanation: String) -> Self {
        Self {
            clarification_needed: false,
            questions: None,
            result: Some(result),
            explanation: Some(explanation),
        }
    }
}

/// Outcome label of a feedback submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    Useful,
    Reformulated,
}

/// Response to submitted feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub status: FeedbackStatus,
    /// Rewritten question to submit again; present only when reformulated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_question: Option<String>,
}

impl FeedbackResponse {
    pub fn useful() -> Self {
        Self {
            status: FeedbackStatus::Useful,
            new_question: None,
        }
    }

    pub fn reformulated(new_question: String) -> Self {
        Self {
            status: FeedbackStatus::Reformulated,
            new_question: Some(new_question),
        }
    }
}
