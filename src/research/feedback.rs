//! 澄清问题：研究开始前向用户追问研究方向

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::core::ResearchError;
use crate::llm::{decode, StructuredClient, StructuredRequest};
use crate::research::prompts;

#[derive(Debug, Deserialize, JsonSchema)]
struct FeedbackQuestions {
    /// Follow up questions to clarify the research direction
    questions: Vec<String>,
}

pub struct FeedbackGenerator {
    client: Arc<dyn StructuredClient>,
}

impl FeedbackGenerator {
    pub fn new(client: Arc<dyn StructuredClient>) -> Self {
        Self { client }
    }

    pub async fn generate_feedback(
        &self,
        query: &str,
        max_questions: usize,
    ) -> Result<Vec<String>, ResearchError> {
        let request = StructuredRequest::for_type::<FeedbackQuestions>(
            "feedback_questions",
            prompts::system_prompt(),
            prompts::feedback_prompt(query, max_questions),
        )
        .with_max_items("questions", max_questions);
        let mut out: FeedbackQuestions = decode(self.client.as_ref(), &request).await?;
        out.questions.truncate(max_questions);
        Ok(out.questions)
    }
}

/// 把初始查询与问答拼成研究主题
pub fn combine_query(initial: &str, qa_pairs: &[(String, String)]) -> String {
    let qa: String = qa_pairs
        .iter()
        .map(|(q, a)| format!("\nQ: {q}\nA: {a}"))
        .collect();
    format!("Initial Query: {initial}\nFollow-up Questions and Answers:{qa}")
}
