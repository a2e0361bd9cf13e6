//! Query execution stage with a single correction retry.
//!
//! The agent runs at most twice per request: the initial attempt on the
//! combined instruction and, when that fails, one attempt with an
//! error-informed corrected query.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use parley_storage::TenantRepository;

use crate::agent::{AgentInput, DataSource, QueryAgent};
use crate::error::{ChatError, ExecutionError};
use crate::llm::TextGenerator;
use crate::prompts;
use crate::state::{ExecutionState, StateTracker};
use crate::types::QueryOutcome;

/// Inputs of one execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub tenant: &'a str,
    pub database: &'a str,
    pub schema_text: &'a str,
    pub context_text: &'a str,
    pub question: &'a str,
    pub clarifications: &'a [String],
}

pub struct QueryExecutionStage {
    registry: TenantRepository,
    agent: Arc<dyn QueryAgent>,
    generator: Arc<dyn TextGenerator>,
    agent_timeout: Duration,
}

impl QueryExecutionStage {
    pub fn new(
        registry: TenantRepository,
        agent: Arc<dyn QueryAgent>,
        generator: Arc<dyn TextGenerator>,
        agent_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            agent,
            generator,
            agent_timeout,
        }
    }

    /// Resolve the physical data source of a logical database.
    pub fn data_source(&self, tenant: &str, database: &str) -> Result<DataSource, ChatError> {
        let path = self.registry.resolve_data_source(tenant, database)?;
        Ok(DataSource {
            tenant: tenant.to_string(),
            database: database.to_string(),
            path,
        })
    }

    /// Run the request, correcting once on failure.
    ///
    /// Lookup failures are returned as errors before anything runs. Execution
    /// failures end as `QueryOutcome::Failure` once the correction is spent.
    pub async fn execute(&self, request: ExecutionRequest<'_>) -> Result<QueryOutcome, ChatError> {
        let source = self.data_source(request.tenant, request.database)?;
        let instruction = prompts::execution_instruction(
            request.context_text,
            request.schema_text,
            request.question,
            request.clarifications,
        );

        let mut state = StateTracker::new("execution", ExecutionState::Built);
        state.advance(ExecutionState::Executing);

        let first_error = match self
            .run_agent(AgentInput::Instruction(&instruction), &source)
            .await
        {
            Ok(result) => {
                state.advance(ExecutionState::Succeeded);
                info!(tenant = %source.tenant, database = %source.database, attempt = 1, "Execution succeeded");
                return Ok(QueryOutcome::Success(result));
            }
            Err(e) => e,
        };

        state.advance(ExecutionState::Failed);
        warn!(
            tenant = %source.tenant,
            database = %source.database,
            attempt = 1,
            error = %first_error,
            "Execution failed, attempting correction"
        );

        state.advance(ExecutionState::Correcting);
        let corrected = self
            .generator
            .generate(&prompts::correction(
                request.schema_text,
                &instruction,
                &first_error.to_string(),
            ))
            .await?;
        let corrected = corrected.trim();

        if corrected.is_empty() {
            state.advance(ExecutionState::FailedFinal);
            warn!(tenant = %source.tenant, database = %source.database, "Correction produced no query");
            return Ok(QueryOutcome::Failure(first_error.to_string()));
        }

        state.advance(ExecutionState::ReExecuting);
        match self.run_agent(AgentInput::Query(corrected), &source).await {
            Ok(result) => {
                state.advance(ExecutionState::Succeeded);
                info!(tenant = %source.tenant, database = %source.database, attempt = 2, "Execution succeeded after correction");
                Ok(QueryOutcome::Success(result))
            }
            Err(second_error) => {
                state.advance(ExecutionState::FailedFinal);
                warn!(
                    tenant = %source.tenant,
                    database = %source.database,
                    attempt = 2,
                    error = %second_error,
                    "Execution failed after correction"
                );
                Ok(QueryOutcome::Failure(second_error.to_string()))
            }
        }
    }

    /// Expiry drops the agent future, which stops its work.
    async fn run_agent(
        &self,
        input: AgentInput<'_>,
        source: &DataSource,
    ) -> Result<String, ExecutionError> {
        match tokio::time::timeout(self.agent_timeout, self.agent.run(input, source)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.agent_timeout.as_secs())),
        }
    }
}
