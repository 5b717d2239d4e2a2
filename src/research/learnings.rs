//! 要点提炼：把一次搜索的正文浓缩为要点与后续研究方向

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::core::ResearchError;
use crate::llm::{decode, StructuredClient, StructuredRequest};
use crate::memory::trim_prompt;
use crate::research::prompts;
use crate::tools::SearchResult;

/// 单条搜索正文默认 token 预算
pub const DEFAULT_CONTENT_TOKEN_BUDGET: usize = 25_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Learnings {
    /// List of learnings
    pub learnings: Vec<String>,
    /// List of follow-up questions to research the topic further
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

pub struct LearningExtractor {
    client: Arc<dyn StructuredClient>,
    content_token_budget: usize,
}

impl LearningExtractor {
    pub fn new(client: Arc<dyn StructuredClient>) -> Self {
        Self {
            client,
            content_token_budget: DEFAULT_CONTENT_TOKEN_BUDGET,
        }
    }

    pub fn with_content_token_budget(mut self, budget: usize) -> Self {
        self.content_token_budget = budget;
        self
    }

    pub async fn extract(
        &self,
        query: &str,
        results: &[SearchResult],
        max_learnings: usize,
        max_follow_ups: usize,
    ) -> Result<Learnings, ResearchError> {
        let contents: Vec<String> = results
            .iter()
            .filter(|r| !r.content.is_empty())
            .map(|r| trim_prompt(&r.content, self.content_token_budget))
            .collect();
        tracing::debug!(query = %query, contents = contents.len(), "extracting learnings");

        let prompt = trim_prompt(
            &prompts::learnings_prompt(query, &contents, max_learnings),
            self.client.context_tokens(),
        );
        let request = StructuredRequest::for_type::<Learnings>(
            "serp_learnings",
            prompts::system_prompt(),
            prompt,
        )
        .with_max_items("learnings", max_learnings)
        .with_max_items("followUpQuestions", max_follow_ups);

        let mut out: Learnings = decode(self.client.as_ref(), &request).await?;
        out.learnings.truncate(max_learnings);
        out.follow_up_questions.truncate(max_follow_ups);
        tracing::info!(
            query = %query,
            learnings = out.learnings.len(),
            follow_ups = out.follow_up_questions.len(),
            "extracted learnings"
        );
        Ok(out)
    }
}
