//! 模型选择：根据可用凭证解析出唯一的模型描述
//!
//! 优先级：自定义端点（模型 + Key）> DeepSeek（固定 deepseek-chat）> OpenAI（固定 o3-mini）。
//! DeepSeek 提供与 OpenAI 完全兼容的 API 接口。

use crate::config::LlmSection;
use crate::core::ResearchError;
use crate::llm::DEFAULT_CONTEXT_TOKENS;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "o3-mini";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 已解析的模型：Key、端点、模型名与上下文预算
#[derive(Clone)]
pub struct ModelDescriptor {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub context_tokens: usize,
}

impl std::fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("context_tokens", &self.context_tokens)
            .finish()
    }
}

/// 可用凭证
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// 自定义 OpenAI 兼容端点
    pub custom_base_url: Option<String>,
    pub custom_api_key: Option<String>,
    pub custom_model: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub context_tokens: Option<usize>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Credentials {
    /// 从 [llm] 配置读取，缺失项回退到环境变量 DEEPSEEK_API_KEY / OPENAI_API_KEY
    pub fn from_config(section: &LlmSection) -> Self {
        Self {
            custom_base_url: non_empty(section.base_url.clone()),
            custom_api_key: non_empty(section.api_key.clone()),
            custom_model: non_empty(section.model.clone()),
            deepseek_api_key: non_empty(section.deepseek_api_key.clone())
                .or_else(|| non_empty(std::env::var("DEEPSEEK_API_KEY").ok())),
            openai_api_key: non_empty(section.openai_api_key.clone())
                .or_else(|| non_empty(std::env::var("OPENAI_API_KEY").ok())),
            context_tokens: section.context_tokens,
        }
    }
}

/// 解析模型；没有任何凭证时返回 MissingCredentials
pub fn resolve_model(creds: &Credentials) -> Result<ModelDescriptor, ResearchError> {
    let context_tokens = creds.context_tokens.unwrap_or(DEFAULT_CONTEXT_TOKENS);

    // 自定义模型需要模型名与 Key（Key 缺失时借用 OpenAI Key）
    let custom_key = creds
        .custom_api_key
        .clone()
        .or_else(|| creds.openai_api_key.clone());
    if let (Some(model), Some(api_key)) = (creds.custom_model.clone(), custom_key) {
        return Ok(ModelDescriptor {
            api_key,
            base_url: creds
                .custom_base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model,
            context_tokens,
        });
    }

    if let Some(api_key) = creds.deepseek_api_key.clone() {
        return Ok(ModelDescriptor {
            api_key,
            base_url: DEEPSEEK_BASE_URL.to_string(),
            model: DEEPSEEK_CHAT.to_string(),
            context_tokens,
        });
    }

    if let Some(api_key) = creds.openai_api_key.clone() {
        return Ok(ModelDescriptor {
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
            model: OPENAI_DEFAULT_MODEL.to_string(),
            context_tokens,
        });
    }

    Err(ResearchError::MissingCredentials)
}
