//! Conversational query pipeline for parley.
//!
//! Turns natural-language questions into answers over a tenant's database:
//! clarification, query execution with one correction retry, plain-language
//! explanation, and feedback-driven reformulation, all recorded in an
//! append-only conversation log.

pub mod agent;
pub mod clarify;
pub mod context;
pub mod error;
pub mod execute;
pub mod explain;
pub mod feedback;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod schema;
pub mod state;
pub mod types;

pub use agent::{AgentInput, DataSource, QueryAgent, SqliteAgent};
pub use clarify::ClarificationStage;
pub use context::{estimate_tokens, select_window, ContextEntry, ContextStore, ContextWindow};
pub use error::{ChatError, ExecutionError};
pub use execute::{ExecutionRequest, QueryExecutionStage};
pub use explain::ExplanationStage;
pub use feedback::FeedbackStage;
pub use llm::{CommandGenerator, TextGenerator, TimeoutGenerator};
pub use orchestrator::Orchestrator;
pub use schema::SchemaResolver;
pub use state::{ExecutionState, FeedbackState, QuestionState};
pub use types::{
    ClarificationOutcome, FeedbackResponse, FeedbackStatus, FeedbackVerdict, QueryOutcome,
    QuestionResponse,
};
