//! Explanation stage: turn a raw query result into plain language.

use std::sync::Arc;

use tracing::info;

use crate::error::ChatError;
use crate::llm::TextGenerator;
use crate::prompts;

pub struct ExplanationStage {
    generator: Arc<dyn TextGenerator>,
}

impl ExplanationStage {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generated explanation with surrounding whitespace trimmed, otherwise untouched.
    pub async fn explain(
        &self,
        context_text: &str,
        question: &str,
        schema_text: &str,
        raw_result: &str,
    ) -> Result<String, ChatError> {
        let prompt = prompts::explanation(context_text, question, schema_text, raw_result);
        let explanation = self.generator.generate(&prompt).await?.trim().to_string();
        info!(len = explanation.len(), "Explanation generated");
        Ok(explanation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedGenerator {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct DownGenerator;

    #[async_trait]
    impl TextGenerator for DownGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, ChatError> {
            Err(ChatError::Generation("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_explain_trims_only() {
        let generator = Arc::new(FixedGenerator {
            reply: "\n  There were 42 orders.\n\nWas this explanation helpful?  \n".to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let stage = ExplanationStage::new(generator.clone());
        let text = stage
            .explain("user: hi", "How many orders?", "Table orders:\nOrders.", "n\n42")
            .await
            .unwrap();
        assert_eq!(text, "There were 42 orders.\n\nWas this explanation helpful?");

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("\"n\n42\""));
        assert!(prompts[0].contains("\"How many orders?\""));
    }

    #[tokio::test]
    async fn test_explain_propagates_generation_errors() {
        let stage = ExplanationStage::new(Arc::new(DownGenerator));
        let err = stage.explain("", "q", "s", "r").await.unwrap_err();
        assert!(err.is_transient());
    }
}
