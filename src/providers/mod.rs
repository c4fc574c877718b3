pub mod base;
pub mod openai;
pub mod stub;

pub use base::{ChatRequest, LLMProvider, LLMResponse, Message, ToolCallRequest, ToolDefinition};
pub use openai::OpenAIProvider;
pub use stub::StubProvider;
