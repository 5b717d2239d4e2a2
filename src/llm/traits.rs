//! 结构化补全客户端抽象
//!
//! 每个调用点定义自己的输出结构体（Deserialize + JsonSchema），
//! StructuredRequest 由 schemars 生成参数 schema，decode 负责把模型输出解析回结构体。

use async_trait::async_trait;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::ResearchError;

/// 默认模型上下文预算（token）
pub const DEFAULT_CONTEXT_TOKENS: usize = 128_000;

/// 一次结构化补全请求
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    /// function 名，同时用于日志与 Mock 路由
    pub name: String,
    pub system: String,
    pub prompt: String,
    /// function 参数的 JSON Schema
    pub schema: Value,
}

impl StructuredRequest {
    /// 以 T 的 schema 构造请求（子 schema 全部内联，不含 $ref）
    pub fn for_type<T: JsonSchema>(
        name: impl Into<String>,
        system: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            system: system.into(),
            prompt: prompt.into(),
            schema: schema_value::<T>(),
        }
    }

    /// 限制顶层数组字段的最大条数（schema 的 maxItems）
    pub fn with_max_items(mut self, field: &str, max: usize) -> Self {
        let pointer = format!("/properties/{}", field);
        if let Some(prop) = self.schema.pointer_mut(&pointer).and_then(Value::as_object_mut) {
            prop.insert("maxItems".to_string(), Value::from(max));
        }
        self
    }
}

/// 生成 T 的 JSON Schema（draft-07，内联子 schema，去掉 $schema / title）
pub fn schema_value<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.option_add_null_type = false;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<T>();
    let mut value = serde_json::to_value(root).unwrap_or_else(|_| Value::Object(Default::default()));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.remove("definitions");
    }
    value
}

/// 结构化补全客户端：给定 system / prompt / schema，返回解码前的 JSON
#[async_trait]
pub trait StructuredClient: Send + Sync {
    async fn complete_structured(&self, request: &StructuredRequest) -> Result<Value, ResearchError>;

    /// 模型上下文预算（token），用于截断整段 prompt
    fn context_tokens(&self) -> usize {
        DEFAULT_CONTEXT_TOKENS
    }

    /// 模型名（日志用）
    fn model_name(&self) -> &str {
        "unknown"
    }

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 调用并把输出解码为 T；解码失败归为 MalformedOutput
pub async fn decode<T: DeserializeOwned>(
    client: &dyn StructuredClient,
    request: &StructuredRequest,
) -> Result<T, ResearchError> {
    let value = client.complete_structured(request).await?;
    serde_json::from_value(value).map_err(|e| {
        ResearchError::MalformedOutput(format!("{} ({})", e, request.name))
    })
}
