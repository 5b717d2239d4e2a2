//! Mock 结构化补全客户端（用于测试，无需 API）
//!
//! 由调用方提供的闭包按请求返回 JSON，并记录收到的全部请求，便于断言 prompt 与 schema。

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ResearchError;
use crate::llm::{StructuredClient, StructuredRequest, DEFAULT_CONTEXT_TOKENS};

type Handler = dyn Fn(&StructuredRequest) -> Result<Value, ResearchError> + Send + Sync;

/// Mock 客户端
pub struct MockStructuredClient {
    handler: Box<Handler>,
    calls: Mutex<Vec<StructuredRequest>>,
    context_tokens: usize,
}

impl MockStructuredClient {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&StructuredRequest) -> Result<Value, ResearchError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            context_tokens: DEFAULT_CONTEXT_TOKENS,
        }
    }

    pub fn with_context_tokens(mut self, tokens: usize) -> Self {
        self.context_tokens = tokens;
        self
    }

    /// 已收到的请求（按到达顺序）
    pub fn calls(&self) -> Vec<StructuredRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// 指定 function 名的请求
    pub fn calls_named(&self, name: &str) -> Vec<StructuredRequest> {
        self.calls()
            .into_iter()
            .filter(|r| r.name == name)
            .collect()
    }
}

#[async_trait]
impl StructuredClient for MockStructuredClient {
    async fn complete_structured(&self, request: &StructuredRequest) -> Result<Value, ResearchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        // 让出一次调度，模拟网络挂起点
        tokio::task::yield_now().await;
        (self.handler)(request)
    }

    fn context_tokens(&self) -> usize {
        self.context_tokens
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_calls() {
        let mock = MockStructuredClient::new(|req| Ok(json!({ "echo": req.prompt })));
        let req = StructuredRequest {
            name: "final_answer".into(),
            system: "s".into(),
            prompt: "hello".into(),
            schema: json!({}),
        };
        let v = mock.complete_structured(&req).await.unwrap();
        assert_eq!(v["echo"], "hello");
        assert_eq!(mock.calls_named("final_answer").len(), 1);
        assert!(mock.calls_named("other").is_empty());
    }
}
