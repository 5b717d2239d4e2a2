//! Token 预算截断
//!
//! 按近似 token 数（4 字符/token）把任意长文本截到预算内；
//! 优先在段落、句子、单词边界处切断（text-splitter），切不动时退化为按字符硬截。

use text_splitter::TextSplitter;

/// 截断后保留的最少字符数
pub const MIN_CHUNK_SIZE: usize = 140;

/// 每个 token 约等于的字符数
const CHARS_PER_TOKEN: usize = 4;

/// Token 估算器（字符数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// ceil(字符数 / 4)
    pub fn estimate(text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}

/// 截断结果的长度上界（字符）
pub fn max_trimmed_chars(budget: usize) -> usize {
    (budget * CHARS_PER_TOKEN).max(MIN_CHUNK_SIZE)
}

/// 将文本截到约 `budget` 个 token 以内；已在预算内时原样返回
pub fn trim_prompt(text: &str, budget: usize) -> String {
    let mut current = text.to_string();
    loop {
        let tokens = TokenEstimator::estimate(&current);
        if tokens <= budget {
            return current;
        }

        let len = current.chars().count();
        let overflow = tokens - budget;
        let target = len
            .saturating_sub(overflow * CHARS_PER_TOKEN)
            .max(MIN_CHUNK_SIZE);
        if target >= len {
            // 已到最小长度，不再缩短
            return current;
        }

        let splitter = TextSplitter::new(target);
        let first = splitter.chunks(&current).next().unwrap_or("");
        let shorter = if first.is_empty() || first.chars().count() >= len {
            hard_cut(&current, target)
        } else {
            first.to_string()
        };

        tracing::debug!(from = len, to = shorter.chars().count(), budget, "trimmed prompt");
        current = shorter;
    }
}

/// 按字符（非字节）截取前 n 个
fn hard_cut(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}
