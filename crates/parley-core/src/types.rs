use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An isolation boundary owning logical databases and users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    /// Unique tenant name.
    pub name: String,
}

/// A named binding of one physical data source within a tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalDatabase {
    pub id: i64,
    pub tenant: String,
    /// Name unique within the tenant (e.g. "sales", "hr").
    pub name: String,
    /// Path of the SQLite file holding the tenant's data.
    pub data_source: PathBuf,
}

/// A user belonging to exactly one tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub tenant: String,
    pub name: String,
}

/// Who produced a conversation turn, and at which pipeline step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// A question submitted by the user.
    User,
    /// Follow-up questions asked before answering.
    AssistantClarification,
    /// Raw result of the executed query (or the final failure message).
    AssistantQueryResult,
    /// Plain-language explanation of a query result.
    AssistantExplanation,
    /// Free-text feedback on an explanation.
    UserFeedback,
    /// Question rewritten after unsatisfying feedback.
    AssistantReformulatedQuery,
}

impl TurnRole {
    /// All roles, in pipeline order.
    pub const ALL: [TurnRole; 6] = [
        TurnRole::User,
        TurnRole::AssistantClarification,
        TurnRole::AssistantQueryResult,
        TurnRole::AssistantExplanation,
        TurnRole::UserFeedback,
        TurnRole::AssistantReformulatedQuery,
    ];

    /// Stable identifier used in storage and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::AssistantClarification => "assistant_clarification",
            TurnRole::AssistantQueryResult => "assistant_query_result",
            TurnRole::AssistantExplanation => "assistant_explanation",
            TurnRole::UserFeedback => "user_feedback",
            TurnRole::AssistantReformulatedQuery => "assistant_reformulated_query",
        }
    }

    /// Whether the turn was written on the user's behalf.
    pub fn is_user(&self) -> bool {
        match self {
            TurnRole::User | TurnRole::UserFeedback => true,
            TurnRole::AssistantClarification
            | TurnRole::AssistantQueryResult
            | TurnRole::AssistantExplanation
            | TurnRole::AssistantReformulatedQuery => false,
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(TurnRole::User),
            "assistant_clarification" => Ok(TurnRole::AssistantClarification),
            "assistant_query_result" => Ok(TurnRole::AssistantQueryResult),
            "assistant_explanation" => Ok(TurnRole::AssistantExplanation),
            "user_feedback" => Ok(TurnRole::UserFeedback),
            "assistant_reformulated_query" => Ok(TurnRole::AssistantReformulatedQuery),
            _ => Err(format!("Unknown turn role: {}", s)),
        }
    }
}

/// One recorded conversational event. Turns are never mutated once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    /// Monotonic position in the log; defines call order.
    pub seq: i64,
    pub tenant: String,
    pub user: String,
    pub role: TurnRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
