//! OpenAI 兼容结构化补全客户端
//!
//! POST {base_url}/chat/completions，附带一个 function tool（参数即目标 schema）并强制调用。
//! 取值顺序：tool call 参数 > 消息内容按 JSON 解析 > 包装为 {"content": 原文}。
//! 直接用 reqwest 发请求，以便拿到 HTTP 状态码做错误归类；不做任何自动重试。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::ResearchError;
use crate::llm::{ModelDescriptor, StructuredClient, StructuredRequest};

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    function: ChatFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ChatFunctionCall {
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// 各次响应 usage 的累计；total 由两项相加得出
#[derive(Debug, Default)]
struct UsageTotals {
    prompt: AtomicU64,
    completion: AtomicU64,
}

impl UsageTotals {
    fn record(&self, usage: &ChatUsage) {
        self.prompt.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion
            .fetch_add(usage.completion_tokens, Ordering::Relaxed);
    }

    fn totals(&self) -> (u64, u64, u64) {
        let prompt = self.prompt.load(Ordering::Relaxed);
        let completion = self.completion.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

/// OpenAI 兼容客户端：持有 HTTP Client 与已解析的模型
pub struct OpenAiClient {
    client: Client,
    model: ModelDescriptor,
    usage: UsageTotals,
}

impl OpenAiClient {
    pub fn new(model: ModelDescriptor, timeout_secs: u64) -> Result<Self, ResearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ResearchError::Generic(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            model,
            usage: UsageTotals::default(),
        })
    }

    /// 由 base_url 推出 chat completions 端点
    fn endpoint(&self) -> String {
        let base = self.model.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    fn request_body(&self, request: &StructuredRequest) -> Value {
        json!({
            "model": self.model.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "tools": [{
                "type": "function",
                "function": {
                    "name": request.name,
                    "description": format!("Return the {} as structured JSON", request.name),
                    "parameters": request.schema,
                }
            }],
            "tool_choice": {
                "type": "function",
                "function": { "name": request.name }
            },
        })
    }
}

/// 从模型消息中取出结构化结果
pub(crate) fn extract_structured(message: ChatMessage) -> Value {
    let from_tool = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .find_map(|call| serde_json::from_str::<Value>(&call.function.arguments).ok())
        .filter(Value::is_object);
    if let Some(value) = from_tool {
        return value;
    }

    let content = message.content.unwrap_or_default();
    if let Some(value) = parse_json_content(&content) {
        return value;
    }
    json!({ "content": content })
}

/// 提取 JSON 块（```json ... ``` 或首个 { 到最后一个 }）
fn parse_json_content(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else {
        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        if end < start {
            return None;
        }
        &trimmed[start..=end]
    };
    serde_json::from_str::<Value>(json_str)
        .ok()
        .filter(Value::is_object)
}

#[async_trait]
impl StructuredClient for OpenAiClient {
    async fn complete_structured(&self, request: &StructuredRequest) -> Result<Value, ResearchError> {
        tracing::debug!(
            model = %self.model.model,
            function = %request.name,
            prompt_chars = request.prompt.len(),
            "structured completion"
        );

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.model.api_key)
            .json(&self.request_body(request))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ResearchError::classify_status(status, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ResearchError::MalformedOutput(format!("chat response: {}", e)))?;

        if let Some(usage) = &parsed.usage {
            self.usage.record(usage);
        }

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ResearchError::MalformedOutput("no choices in response".to_string()))?;

        Ok(extract_structured(message))
    }

    fn context_tokens(&self) -> usize {
        self.model.context_tokens
    }

    fn model_name(&self) -> &str {
        &self.model.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.totals()
    }
}
