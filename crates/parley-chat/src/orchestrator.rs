//! Query orchestrator: central coordinator wiring context, schema and stages.
//!
//! Runs each question through clarification, execution and explanation, and
//! each feedback through classification and reformulation. Every turn is
//! recorded at the point it is produced, and requests for the same
//! (tenant, user) are processed one at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use parley_core::config::ParleyConfig;
use parley_core::types::{Turn, TurnRole};
use parley_storage::{Database, SchemaRepository, TenantRepository, TurnRepository};

use crate::agent::QueryAgent;
use crate::clarify::ClarificationStage;
use crate::context::ContextStore;
use crate::error::ChatError;
use crate::execute::{ExecutionRequest, QueryExecutionStage};
use crate::explain::ExplanationStage;
use crate::feedback::FeedbackStage;
use crate::llm::{TextGenerator, TimeoutGenerator};
use crate::schema::SchemaResolver;
use crate::state::{FeedbackState, QuestionState, StateTracker};
use crate::types::{
    ClarificationOutcome, FeedbackResponse, FeedbackVerdict, QueryOutcome, QuestionResponse,
};

// =============================================================================
// Per-user serialization
// =============================================================================

/// One async mutex per (tenant, user) pair.
///
/// An entry lives only while some request holds or awaits its lock.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, tenant: &str, user: &str) -> UserGuard<'_> {
        let key = (tenant.to_string(), user.to_string());
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        UserGuard {
            locks: self,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Held for the duration of one request; releases and evicts on drop.
struct UserGuard<'a> {
    locks: &'a UserLocks,
    key: (String, String),
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .locks
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Clones are only taken under this map lock, so a count of one means
        // no request holds or awaits the entry.
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Coordinates the pipeline stages for every tenant and user.
pub struct Orchestrator {
    context: ContextStore,
    schemas: SchemaResolver,
    clarifier: ClarificationStage,
    executor: QueryExecutionStage,
    explainer: ExplanationStage,
    feedback: FeedbackStage,
    locks: UserLocks,
    token_budget: usize,
    reformulation_token_budget: Option<usize>,
    max_question_length: usize,
}

impl Orchestrator {
    /// Build the pipeline over `db`.
    ///
    /// Every generation call is bounded by `[generation] timeout_secs` and
    /// every agent run by `[execution] timeout_secs`.
    pub fn new(
        db: Arc<Database>,
        generator: Arc<dyn TextGenerator>,
        agent: Arc<dyn QueryAgent>,
        config: &ParleyConfig,
    ) -> Self {
        let generator: Arc<dyn TextGenerator> = Arc::new(TimeoutGenerator::new(
            generator,
            Duration::from_secs(config.generation.timeout_secs),
        ));

        Self {
            context: ContextStore::new(TurnRepository::new(Arc::clone(&db))),
            schemas: SchemaResolver::new(SchemaRepository::new(Arc::clone(&db))),
            clarifier: ClarificationStage::new(Arc::clone(&generator)),
            executor: QueryExecutionStage::new(
                TenantRepository::new(db),
                agent,
                Arc::clone(&generator),
                Duration::from_secs(config.execution.timeout_secs),
            ),
            explainer: ExplanationStage::new(Arc::clone(&generator)),
            feedback: FeedbackStage::new(generator),
            locks: UserLocks::default(),
            token_budget: config.context.token_budget,
            reformulation_token_budget: config.context.reformulation_token_budget,
            max_question_length: config.chat.max_question_length,
        }
    }

    /// Answer a question, or ask for clarification first.
    pub async fn submit_question(
        &self,
        tenant: &str,
        database: &str,
        user: &str,
        question: &str,
    ) -> Result<QuestionResponse, ChatError> {
        let question = self.validate("question", question)?;
        require("user", user)?;

        let _guard = self.locks.acquire(tenant, user).await;
        let mut state = StateTracker::new("question", QuestionState::Received);
        info!(tenant, database, user, "Question received");

        // Lookups fail before anything is recorded.
        let schema_text = self.schemas.resolve_text(tenant, database)?;
        self.executor.data_source(tenant, database)?;

        let clarifications = self.pending_clarifications(tenant, user)?;
        self.context.append(tenant, user, TurnRole::User, question)?;

        state.advance(QuestionState::Clarifying);
        let context_text = self.context.window(tenant, user, self.token_budget)?.render();
        let outcome = self
            .clarifier
            .clarify(&schema_text, &context_text, question)
            .await?;

        if let ClarificationOutcome::NeedsClarification(questions) = outcome {
            self.context.append(
                tenant,
                user,
                TurnRole::AssistantClarification,
                &questions.join("\n"),
            )?;
            state.advance(QuestionState::AwaitingUser);
            return Ok(QuestionResponse::clarification(questions));
        }

        state.advance(QuestionState::Clear);
        state.advance(QuestionState::Executing);
        let outcome = self
            .executor
            .execute(ExecutionRequest {
                tenant,
                database,
                schema_text: &schema_text,
                context_text: &context_text,
                question,
                clarifications: &clarifications,
            })
            .await?;

        let result = match outcome {
            QueryOutcome::Success(result) => result,
            QueryOutcome::Failure(error) => {
                self.context.append(
                    tenant,
                    user,
                    TurnRole::AssistantQueryResult,
                    &format!("Query failed: {}", error),
                )?;
                warn!(tenant, database, user, error = %error, "Question could not be answered");
                return Err(ChatError::ExecutionFailed(error));
            }
        };
        self.context
            .append(tenant, user, TurnRole::AssistantQueryResult, &result)?;

        state.advance(QuestionState::Explaining);
        let context_text = self.context.window(tenant, user, self.token_budget)?.render();
        let explanation = self
            .explainer
            .explain(&context_text, question, &schema_text, &result)
            .await?;
        self.context
            .append(tenant, user, TurnRole::AssistantExplanation, &explanation)?;

        state.advance(QuestionState::AwaitingFeedback);
        info!(tenant, database, user, "Question answered");
        Ok(QuestionResponse::answered(result, explanation))
    }

    /// Record feedback on the last explanation and rewrite the question if it
    /// was not useful.
    pub async fn submit_feedback(
        &self,
        tenant: &str,
        database: &str,
        user: &str,
        feedback: &str,
    ) -> Result<FeedbackResponse, ChatError> {
        let feedback = self.validate("feedback", feedback)?;
        require("user", user)?;

        let _guard = self.locks.acquire(tenant, user).await;
        let mut state = StateTracker::new("feedback", FeedbackState::Received);
        info!(tenant, database, user, "Feedback received");

        self.executor.data_source(tenant, database)?;
        self.context
            .append(tenant, user, TurnRole::UserFeedback, feedback)?;

        state.advance(FeedbackState::Classifying);
        if self.feedback.classify_feedback(feedback).await? == FeedbackVerdict::Useful {
            state.advance(FeedbackState::Done);
            return Ok(FeedbackResponse::useful());
        }

        state.advance(FeedbackState::Reformulating);
        let history = match self.reformulation_token_budget {
            Some(budget) => self.context.window(tenant, user, budget)?,
            None => self.context.full_window(tenant, user)?,
        };
        let new_question = self
            .feedback
            .reformulate(&history.render(), feedback)
            .await?;
        self.context.append(
            tenant,
            user,
            TurnRole::AssistantReformulatedQuery,
            &new_question,
        )?;

        state.advance(FeedbackState::Done);
        info!(tenant, database, user, "Question reformulated");
        Ok(FeedbackResponse::reformulated(new_question))
    }

    /// Full conversation of a user, oldest first.
    pub fn history(&self, tenant: &str, user: &str) -> Result<Vec<Turn>, ChatError> {
        self.context.history(tenant, user)
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn schemas(&self) -> &SchemaResolver {
        &self.schemas
    }

    /// Questions of the clarification turn directly preceding this question.
    fn pending_clarifications(&self, tenant: &str, user: &str) -> Result<Vec<String>, ChatError> {
        Ok(match self.context.latest(tenant, user)? {
            Some(turn) if turn.role == TurnRole::AssistantClarification => turn
                .text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        })
    }

    fn validate<'a>(&self, what: &str, text: &'a str) -> Result<&'a str, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation(format!("{} cannot be empty", what)));
        }
        if text.chars().count() > self.max_question_length {
            return Err(ChatError::Validation(format!(
                "{} exceeds maximum length of {} characters",
                what, self.max_question_length
            )));
        }
        Ok(text)
    }
}

fn require(what: &str, value: &str) -> Result<(), ChatError> {
    if value.trim().is_empty() {
        return Err(ChatError::Validation(format!("{} cannot be empty", what)));
    }
    Ok(())
}
