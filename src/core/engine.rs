use crate::core::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A text generation backend.
///
/// `generate` blocks until the model has produced its answer; there is no
/// timeout or cancellation hook at this boundary.
pub trait Engine {
    fn generate(&mut self, messages: &[ChatMessage], max_new_tokens: usize) -> Result<String>;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn generate(&mut self, messages: &[ChatMessage], max_new_tokens: usize) -> Result<String> {
        (**self).generate(messages, max_new_tokens)
    }
}
