//! LLM 层：结构化补全抽象、模型选择与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod model;
pub mod openai;
pub mod traits;

pub use mock::MockStructuredClient;
pub use model::{
    resolve_model, Credentials, ModelDescriptor, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT,
    OPENAI_BASE_URL, OPENAI_DEFAULT_MODEL,
};
pub use openai::OpenAiClient;
pub use traits::{decode, schema_value, StructuredClient, StructuredRequest, DEFAULT_CONTEXT_TOKENS};
