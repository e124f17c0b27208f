use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use quill_core::{Message, ToolSchema};

use crate::protocol::StreamEvent;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API error: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Lazy, single-pass sequence of decoded stream events. Ends normally
/// when the endpoint closes the response; an `Err` item is fatal to the
/// current round.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Issue one streaming completion request against `messages` with
    /// `tools` advertised, and return the decoded event stream.
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<EventStream>;
}
