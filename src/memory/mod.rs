//! 文本预算：近似 token 计数与按语义边界截断

pub mod token_budget;

pub use token_budget::{max_trimmed_chars, trim_prompt, TokenEstimator, MIN_CHUNK_SIZE};
