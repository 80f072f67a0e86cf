pub mod base;
pub mod errors;
pub mod openai;
pub mod salvage;

pub use base::{
    ChatRequest, LLMProvider, LLMResponse, Message, RetryConfig, Role, ToolCallRequest,
    ToolDefinition,
};
pub use openai::OpenAIProvider;
