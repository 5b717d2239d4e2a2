//! 结果合成：长篇报告或简短答案

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::core::ResearchError;
use crate::llm::{decode, StructuredClient, StructuredRequest};
use crate::memory::trim_prompt;
use crate::research::prompts;

/// 要点汇总默认 token 预算
pub const DEFAULT_REPORT_TOKEN_BUDGET: usize = 150_000;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct FinalReport {
    /// Final report on the topic in Markdown
    report_markdown: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct FinalAnswer {
    /// The final answer, make it short and concise, just the answer, no other text
    exact_answer: String,
}

/// 报告末尾的来源列表
pub fn sources_section(visited_urls: &[String]) -> String {
    let list = visited_urls
        .iter()
        .map(|u| format!("- {u}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n\n## Sources\n\n{list}")
}

pub struct Synthesizer {
    client: Arc<dyn StructuredClient>,
    token_budget: usize,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn StructuredClient>) -> Self {
        Self {
            client,
            token_budget: DEFAULT_REPORT_TOKEN_BUDGET,
        }
    }

    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = budget;
        self
    }

    /// Markdown 报告，末尾附来源列表
    pub async fn write_report(
        &self,
        topic: &str,
        learnings: &[String],
        visited_urls: &[String],
    ) -> Result<String, ResearchError> {
        let block = trim_prompt(&prompts::learnings_block(learnings), self.token_budget);
        let request = StructuredRequest::for_type::<FinalReport>(
            "final_report",
            prompts::system_prompt(),
            prompts::report_prompt(topic, &block),
        );
        let report: FinalReport = decode(self.client.as_ref(), &request).await?;
        tracing::info!(
            learnings = learnings.len(),
            sources = visited_urls.len(),
            "report written"
        );
        Ok(format!(
            "{}{}",
            report.report_markdown,
            sources_section(visited_urls)
        ))
    }

    /// 简短答案，不附来源
    pub async fn write_answer(
        &self,
        topic: &str,
        learnings: &[String],
    ) -> Result<String, ResearchError> {
        let block = trim_prompt(&prompts::learnings_block(learnings), self.token_budget);
        let request = StructuredRequest::for_type::<FinalAnswer>(
            "final_answer",
            prompts::system_prompt(),
            prompts::answer_prompt(topic, &block),
        );
        let answer: FinalAnswer = decode(self.client.as_ref(), &request).await?;
        Ok(answer.exact_answer)
    }
}
