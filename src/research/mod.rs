//! 递归研究：查询生成、要点提炼、编排与结果合成

pub mod feedback;
pub mod learnings;
pub mod orchestrator;
pub mod prompts;
pub mod queries;
pub mod synthesis;

pub use feedback::{combine_query, FeedbackGenerator};
pub use learnings::{LearningExtractor, Learnings};
pub use orchestrator::{
    OutputMode, ResearchOptions, ResearchOutcome, ResearchOutput, ResearchRequest,
    ResearchResponse, ResearchResult, Researcher,
};
pub use queries::{QueryGenerator, SerpQuery};
pub use synthesis::{sources_section, Synthesizer};
