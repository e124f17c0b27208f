//! SSE response -> [`EventStream`] adapter.

use eventsource_stream::Eventsource;
use futures_util::{stream, StreamExt};
use reqwest::Response;

use crate::provider::{EventStream, ModelError, Result};
use crate::protocol::StreamEvent;

/// Convert an SSE HTTP [`Response`] into an [`EventStream`].
///
/// `handler` receives each event's data payload and returns the decoded
/// events for it (possibly none). Handler errors surface as
/// `ModelError::Stream` items; the stream itself ends when the response
/// body does, which is the normal termination.
pub fn event_stream_from_sse<H>(response: Response, mut handler: H) -> EventStream
where
    H: FnMut(&str) -> Result<Vec<StreamEvent>> + Send + 'static,
{
    let stream = response
        .bytes_stream()
        .eventsource()
        .map(move |event| {
            let event = event.map_err(|e| ModelError::Stream(e.to_string()))?;
            handler(event.data.as_str()).map_err(|e| ModelError::Stream(e.to_string()))
        })
        .map(|result| {
            let items: Vec<Result<StreamEvent>> = match result {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(err) => vec![Err(err)],
            };
            stream::iter(items)
        })
        .flatten();

    Box::pin(stream)
}
