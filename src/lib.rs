//! deep-research - 递归式深度研究
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类与传播策略、并发限流、进度快照、研究中止
//! - **llm**: 结构化补全抽象与实现（OpenAI 兼容 / Mock）、模型选择
//! - **memory**: token 预算与文本截断
//! - **observability**: 日志初始化
//! - **research**: 查询生成、要点提炼、递归编排、报告 / 答案合成
//! - **tools**: 网页搜索适配器

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod research;
pub mod tools;

pub use crate::core::{ResearchError, AbortHandle};
pub use research::{OutputMode, ResearchRequest, ResearchResponse, ResearchResult, Researcher};
