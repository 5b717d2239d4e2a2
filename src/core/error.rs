//! 研究错误类型与传播策略
//!
//! 在适配器边界（搜索 / 结构化补全）一次性归类为封闭的 ErrorKind；
//! 分支汇合逻辑只根据 ErrorKind 决定上抛（Escalate）还是在分支内吸收（Absorb），不做字符串匹配。

use reqwest::StatusCode;
use thiserror::Error;

/// 研究过程中可能出现的错误（网络、超时、限流、鉴权、服务端、其它）
#[derive(Error, Debug, Clone)]
pub enum ResearchError {
    #[error("Network error: {0}. Please check your internet connection and try again.")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: {0}. Please wait a moment and retry.")]
    RateLimit(String),

    #[error("Authentication failed: {0}. Please check your API keys in Settings.")]
    Authentication(String),

    #[error("No model credentials configured. Set a custom endpoint key, DEEPSEEK_API_KEY or OPENAI_API_KEY in Settings.")]
    MissingCredentials,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Malformed structured output: {0}")]
    MalformedOutput(String),

    #[error("Invalid research request: {0}")]
    InvalidRequest(String),

    #[error("Research cancelled")]
    Cancelled,

    #[error("{0}")]
    Generic(String),
}

/// 封闭的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Timeout,
    RateLimit,
    Authentication,
    ServerError,
    Generic,
    /// 整体研究被取消（Ctrl+C 或调用方主动取消）
    Cancelled,
}

/// 分支出错时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// 终止当前层的整个汇合（同层其它分支结果丢弃）
    Escalate,
    /// 仅丢弃出错分支，贡献空结果
    Absorb,
}

impl ErrorKind {
    pub fn policy(self) -> ErrorPolicy {
        match self {
            ErrorKind::RateLimit | ErrorKind::Authentication | ErrorKind::Cancelled => {
                ErrorPolicy::Escalate
            }
            ErrorKind::Network
            | ErrorKind::Timeout
            | ErrorKind::ServerError
            | ErrorKind::Generic => ErrorPolicy::Absorb,
        }
    }
}

impl ResearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResearchError::Network(_) => ErrorKind::Network,
            ResearchError::Timeout(_) => ErrorKind::Timeout,
            ResearchError::RateLimit(_) => ErrorKind::RateLimit,
            ResearchError::Authentication(_) | ResearchError::MissingCredentials => {
                ErrorKind::Authentication
            }
            ResearchError::Server { .. } => ErrorKind::ServerError,
            ResearchError::Cancelled => ErrorKind::Cancelled,
            ResearchError::Api { .. }
            | ResearchError::MalformedOutput(_)
            | ResearchError::InvalidRequest(_)
            | ResearchError::Generic(_) => ErrorKind::Generic,
        }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.kind().policy()
    }

    /// 按 HTTP 状态码归类非 2xx 响应；body 中的 quota 字样也视为限流
    pub fn classify_status(status: StatusCode, body: &str) -> Self {
        let code = status.as_u16();
        let lowered = body.to_lowercase();
        match code {
            401 | 403 => ResearchError::Authentication(summarize_body(code, body)),
            429 => ResearchError::RateLimit(summarize_body(code, body)),
            _ if lowered.contains("insufficient_quota") || lowered.contains("rate limit") => {
                ResearchError::RateLimit(summarize_body(code, body))
            }
            500..=599 => ResearchError::Server {
                status: code,
                message: body.trim().to_string(),
            },
            _ => ResearchError::Api {
                status: code,
                body: body.trim().to_string(),
            },
        }
    }
}

fn summarize_body(code: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", code)
    } else {
        format!("HTTP {}: {}", code, body.chars().take(300).collect::<String>())
    }
}

impl From<reqwest::Error> for ResearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ResearchError::Timeout(e.to_string())
        } else if e.is_connect() {
            ResearchError::Network(e.to_string())
        } else if let Some(status) = e.status() {
            ResearchError::classify_status(status, &e.to_string())
        } else if e.is_decode() {
            ResearchError::MalformedOutput(e.to_string())
        } else {
            ResearchError::Generic(e.to_string())
        }
    }
}
