use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

use crate::converter::ConversionEvent;

pub fn build_sse_response<S>(stream: S) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send>
where
    S: Stream<Item = ConversionEvent> + Send + 'static,
{
    let stream = stream.map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());

        // Event name lets clients route with `addEventListener`.
        let name = match event {
            ConversionEvent::Delta { .. } => "latex.delta",
            ConversionEvent::Done { .. } => "latex.done",
            ConversionEvent::Error { .. } => "error",
        };

        Ok(Event::default().event(name).data(json))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
