//! 外部工具：网页搜索

pub mod search;

pub use search::{FirecrawlSearch, SearchClient, SearchResult, FIRECRAWL_BASE_URL};
