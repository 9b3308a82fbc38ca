mod openai;
pub mod prompts;

pub use openai::{OpenAiClient, OpenAiConfig};

use crate::errors::AppResult;
use crate::models::{Message, MessageRole};
use std::future::Future;
use std::pin::Pin;

pub type CompletionFuture = Pin<Box<dyn Future<Output = AppResult<String>> + Send>>;

/// One turn of the conversation as sent to the completion service.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Seam to the LLM completion service: a system prompt plus ordered turns in,
/// one assistant string out. An empty completion is an upstream failure, not
/// a silent no-op.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, system_prompt: &str, turns: &[ChatTurn], max_tokens: u32) -> CompletionFuture;
}
