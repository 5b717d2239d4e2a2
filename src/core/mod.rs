//! 核心层：错误分类与传播策略、并发限流、进度快照、研究中止

pub mod error;
pub mod limiter;
pub mod progress;
pub mod shutdown;

pub use error::{ErrorKind, ErrorPolicy, ResearchError};
pub use limiter::{ConcurrencyLimiter, LimiterScope};
pub use progress::{Progress, ProgressTracker, ProgressUpdate};
pub use shutdown::{AbortHandle, AbortReason};
