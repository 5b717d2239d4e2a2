//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RESEARCH__*` 覆盖（双下划线表示嵌套，如 `RESEARCH__RESEARCH__BREADTH=6`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::LimiterScope;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub research: ResearchSection,
}

/// [llm] 段：自定义端点与各家 Key；模型选择见 llm::resolve_model
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 自定义 OpenAI 兼容端点（如本地 LM Studio）
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// 自定义模型名；与 api_key 同时存在时优先使用
    pub model: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// 模型上下文预算（token）
    pub context_tokens: Option<usize>,
    /// 单次补全请求超时（秒）
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_timeout_secs() -> u64 {
    60
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: None,
            deepseek_api_key: None,
            openai_api_key: None,
            context_tokens: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// [search] 段：搜索服务端点、Key、超时与每次返回条数
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_search_limit() -> usize {
    5
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: default_search_timeout_secs(),
            limit: default_search_limit(),
        }
    }
}

impl SearchSection {
    /// 配置优先，其次环境变量 FIRECRAWL_API_KEY / FIRECRAWL_KEY
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("FIRECRAWL_API_KEY").ok())
            .or_else(|| std::env::var("FIRECRAWL_KEY").ok())
            .filter(|k| !k.is_empty())
    }

    /// 配置优先，其次环境变量 FIRECRAWL_BASE_URL
    pub fn resolved_base_url(&self) -> Option<String> {
        self.base_url
            .clone()
            .or_else(|| std::env::var("FIRECRAWL_BASE_URL").ok())
            .filter(|u| !u.is_empty())
    }
}

/// [research] 段：默认广度 / 深度、并发、预算
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchSection {
    #[serde(default = "default_breadth")]
    pub breadth: usize,
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// 同时在途的外部调用上限
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub limiter_scope: LimiterScope,
    /// 每次提炼的要点上限
    #[serde(default = "default_max_learnings")]
    pub max_learnings: usize,
    /// 单条搜索结果正文的 token 预算
    #[serde(default = "default_content_token_budget")]
    pub content_token_budget: usize,
    /// 报告中要点汇总的 token 预算
    #[serde(default = "default_report_token_budget")]
    pub report_token_budget: usize,
    /// 澄清问题数量上限
    #[serde(default = "default_feedback_questions")]
    pub feedback_questions: usize,
    /// 整体截止时间（秒），不设置则不限
    pub deadline_secs: Option<u64>,
}

fn default_breadth() -> usize {
    4
}

fn default_depth() -> usize {
    2
}

fn default_concurrency() -> usize {
    2
}

fn default_max_learnings() -> usize {
    3
}

fn default_content_token_budget() -> usize {
    25_000
}

fn default_report_token_budget() -> usize {
    150_000
}

fn default_feedback_questions() -> usize {
    3
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            breadth: default_breadth(),
            depth: default_depth(),
            concurrency: default_concurrency(),
            limiter_scope: LimiterScope::default(),
            max_learnings: default_max_learnings(),
            content_token_budget: default_content_token_budget(),
            report_token_budget: default_report_token_budget(),
            feedback_questions: default_feedback_questions(),
            deadline_secs: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 RESEARCH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RESEARCH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RESEARCH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
