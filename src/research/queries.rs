//! 查询生成：把研究主题拆成若干条搜索查询

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::ResearchError;
use crate::llm::{decode, StructuredClient, StructuredRequest};
use crate::research::prompts;

/// 一条搜索查询及其研究目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SerpQuery {
    /// The SERP query
    pub query: String,
    /// First talk about the goal of the research that this query is meant to accomplish, then go deeper into how to advance the research once the results are found, mention additional research directions. Be as specific as possible, especially for additional research directions.
    pub research_goal: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SerpQueryList {
    /// List of SERP queries
    pub queries: Vec<SerpQuery>,
}

pub struct QueryGenerator {
    client: Arc<dyn StructuredClient>,
}

impl QueryGenerator {
    pub fn new(client: Arc<dyn StructuredClient>) -> Self {
        Self { client }
    }

    /// 生成至多 max_queries 条查询；不做去重，错误原样返回
    pub async fn generate(
        &self,
        topic: &str,
        prior_learnings: &[String],
        max_queries: usize,
    ) -> Result<Vec<SerpQuery>, ResearchError> {
        let request = StructuredRequest::for_type::<SerpQueryList>(
            "serp_queries",
            prompts::system_prompt(),
            prompts::serp_queries_prompt(topic, prior_learnings, max_queries),
        )
        .with_max_items("queries", max_queries);

        let list: SerpQueryList = decode(self.client.as_ref(), &request).await?;
        let mut queries = list.queries;
        queries.truncate(max_queries);
        tracing::info!(
            count = queries.len(),
            queries = ?queries.iter().map(|q| q.query.as_str()).collect::<Vec<_>>(),
            "generated serp queries"
        );
        Ok(queries)
    }
}
