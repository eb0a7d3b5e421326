//! LLM integration for augment-forge.
//!
//! This module provides a client for OpenAI-compatible chat completion APIs
//! and the retrying layer the augmentation pipeline drives.
//!
//! ```ignore
//! use augment_forge::llm::{ChatCompletionsClient, GenerationClient, ModelParams, RetryPolicy};
//! use std::sync::Arc;
//!
//! let provider = Arc::new(ChatCompletionsClient::from_env()?);
//! let client = GenerationClient::new(provider, RetryPolicy::default());
//!
//! let completion = client.generate("idx 0", "Q: What is 2 + 2?", &ModelParams::default()).await?;
//! println!("{}", completion.content);
//! ```

pub mod chat;
pub mod client;
pub mod retry;

pub use chat::{
    ChatCompletionsClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message,
    ResponseMessage, Usage, API_BASE_ENV, API_KEY_ENV, DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT,
};
pub use client::{Completion, GenerationClient, ModelParams, ResponseFormat};
pub use retry::{RetryLimit, RetryPolicy};
