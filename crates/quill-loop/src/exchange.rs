use std::pin::Pin;
use std::sync::Arc;

use futures::future::Future;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use quill_core::{
    ChatError, ChatEvent, Conversation, Message, ToolCallAccumulator, ToolCallOutcome,
    ToolCallRequest, ToolInvoker, ToolOutput,
};
use quill_llm::{ModelProvider, StreamEvent};

use crate::config::ExchangeConfig;

type OutcomeFuture = Pin<Box<dyn Future<Output = ToolCallOutcome> + Send>>;

/// What one completion round produced.
struct RoundOutput {
    content: String,
    wire_calls: Vec<quill_core::ToolCall>,
    results: FuturesUnordered<OutcomeFuture>,
    dispatched: usize,
}

/// Drive one user turn to completion.
///
/// Each round streams a completion, dispatches tool calls the moment they
/// become ready, appends the assistant message and the tool results to the
/// conversation, and loops back while the model keeps requesting tools.
/// Progress is reported through `events`; the conversation holds the final
/// state either way.
pub async fn run_exchange(
    conversation: &mut Conversation,
    events: mpsc::Sender<ChatEvent>,
    provider: Arc<dyn ModelProvider>,
    invoker: Arc<dyn ToolInvoker>,
    cancel: CancellationToken,
    config: &ExchangeConfig,
) -> Result<(), ChatError> {
    let tools = invoker.list_tools();

    for round in 1..=config.max_rounds {
        let stream = provider
            .chat_stream(&conversation.messages, &tools)
            .await
            .map_err(|e| ChatError::Model(e.to_string()))?;

        let output = match drain_stream(stream, &events, &invoker, &cancel).await {
            Ok(output) => output,
            Err(e) => {
                let _ = events
                    .send(ChatEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
        };

        let wire_calls = if output.wire_calls.is_empty() {
            None
        } else {
            Some(output.wire_calls)
        };
        conversation.add_message(Message::assistant(output.content, wire_calls));

        if output.dispatched == 0 {
            let _ = events.send(ChatEvent::Complete).await;
            return Ok(());
        }

        let mut results = output.results;
        loop {
            // Stop awaiting in-flight invocations the moment the caller
            // aborts; the backend transport owns their cancellation.
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                outcome = results.next() => match outcome {
                    Some(outcome) => outcome,
                    None => break,
                },
            };
            let _ = events
                .send(ChatEvent::ToolCallResult {
                    tool_call_id: outcome.request_id.clone(),
                    tool_name: outcome.name.clone(),
                    result: outcome.result.clone(),
                })
                .await;
            conversation.add_message(Message::tool_result(
                outcome.request_id,
                outcome.result.text,
            ));
        }

        let _ = events
            .send(ChatEvent::RoundComplete {
                round,
                tool_calls: output.dispatched,
            })
            .await;

        log::debug!(
            "round {} dispatched {} tool call(s), looping back",
            round,
            output.dispatched
        );
    }

    let _ = events
        .send(ChatEvent::Error {
            message: format!("exchange exceeded {} rounds", config.max_rounds),
        })
        .await;
    Err(ChatError::RoundLimitExceeded(config.max_rounds))
}

/// Consume one completion stream: forward deltas, accumulate tool-call
/// fragments, and dispatch each call the moment it becomes ready.
async fn drain_stream(
    mut stream: quill_llm::EventStream,
    events: &mpsc::Sender<ChatEvent>,
    invoker: &Arc<dyn ToolInvoker>,
    cancel: &CancellationToken,
) -> Result<RoundOutput, ChatError> {
    let mut accumulator = ToolCallAccumulator::new();
    let mut content = String::new();
    let results: FuturesUnordered<OutcomeFuture> = FuturesUnordered::new();
    let mut dispatched = 0;

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            item = stream.next() => item,
        };
        let event = match item {
            Some(Ok(event)) => event,
            Some(Err(e)) => return Err(ChatError::Model(e.to_string())),
            None => break,
        };

        match event {
            StreamEvent::Answer(delta) => {
                content.push_str(&delta);
                let _ = events
                    .send(ChatEvent::AnswerDelta { content: delta })
                    .await;
            }
            StreamEvent::Reasoning(delta) => {
                let _ = events
                    .send(ChatEvent::ReasoningDelta { content: delta })
                    .await;
            }
            StreamEvent::ToolCall(fragment) => {
                if let Some(request) = accumulator.push(fragment) {
                    dispatch(request, events, invoker, &results).await;
                    dispatched += 1;
                }
            }
        }
    }

    // Zero-argument calls only become ready once the stream ends.
    for request in accumulator.finish() {
        dispatch(request, events, invoker, &results).await;
        dispatched += 1;
    }

    Ok(RoundOutput {
        content,
        wire_calls: accumulator.wire_calls(),
        results,
        dispatched,
    })
}

/// Announce the call and start it on its own task. The returned future
/// never fails: a panicked tool task is reported as an error outcome so
/// the history still gets a tool message for the call.
async fn dispatch(
    request: ToolCallRequest,
    events: &mpsc::Sender<ChatEvent>,
    invoker: &Arc<dyn ToolInvoker>,
    results: &FuturesUnordered<OutcomeFuture>,
) {
    let _ = events
        .send(ChatEvent::ToolCallRequested {
            tool_call_id: request.id.clone(),
            tool_name: request.name.clone(),
            arguments: request.arguments.clone(),
        })
        .await;

    let id = request.id.clone();
    let name = request.name.clone();
    let invoker = Arc::clone(invoker);
    let handle = tokio::spawn(async move { invoker.invoke(&request).await });

    results.push(Box::pin(async move {
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("tool task for '{}' failed: {}", name, e);
                ToolCallOutcome {
                    request_id: id,
                    name: name.clone(),
                    arguments: Value::Null,
                    result: ToolOutput::error(format!("Tool '{}' task failed: {}", name, e)),
                }
            }
        }
    }));
}
