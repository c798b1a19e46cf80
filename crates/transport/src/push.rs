use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, BoxStream, Stream, StreamExt};

use super::http::{HttpRequest, ReqwestHttpClient};

/// One signal from a server-push subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Open,
    Message(String),
    Done,
    Error(String),
    Closed,
}

/// Dropping the stream closes the underlying subscription.
pub type PushStream = Pin<Box<dyn Stream<Item = PushEvent> + Send>>;

/// Server-push subscription capability injected into the transport.
pub trait PushClient: Send + Sync {
    fn subscribe(&self, request: HttpRequest) -> PushStream;
}

/// Server-Sent Events over a streaming HTTP response.
#[derive(Debug, Clone)]
pub struct SsePushClient {
    http: ReqwestHttpClient,
}

impl SsePushClient {
    /// Creates an SSE client sharing the REST client's connection pool.
    pub fn new(http: ReqwestHttpClient) -> Self {
        Self { http }
    }
}

enum SseState {
    Connect(reqwest::RequestBuilder),
    Read {
        body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
        parser: SseParser,
        pending: VecDeque<PushEvent>,
        eof: bool,
    },
    Finished,
}

impl PushClient for SsePushClient {
    fn subscribe(&self, request: HttpRequest) -> PushStream {
        let builder = self
            .http
            .build(&request)
            .header("Accept", "text/event-stream");

        Box::pin(stream::unfold(
            SseState::Connect(builder),
            |mut state| async move {
                loop {
                    state = match state {
                        SseState::Finished => return None,
                        SseState::Connect(builder) => match builder.send().await {
                            Ok(response) if response.status().is_success() => {
                                let body = response
                                    .bytes_stream()
                                    .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                                    .boxed();
                                let next = SseState::Read {
                                    body,
                                    parser: SseParser::default(),
                                    pending: VecDeque::new(),
                                    eof: false,
                                };
                                return Some((PushEvent::Open, next));
                            }
                            Ok(response) => {
                                let message = format!(
                                    "stream endpoint returned status {}",
                                    response.status().as_u16()
                                );
                                return Some((PushEvent::Error(message), SseState::Finished));
                            }
                            Err(error) => {
                                return Some((
                                    PushEvent::Error(error.to_string()),
                                    SseState::Finished,
                                ));
                            }
                        },
                        SseState::Read {
                            mut body,
                            mut parser,
                            mut pending,
                            eof,
                        } => {
                            if let Some(event) = pending.pop_front() {
                                let next = if matches!(event, PushEvent::Done | PushEvent::Error(_))
                                {
                                    SseState::Finished
                                } else {
                                    SseState::Read {
                                        body,
                                        parser,
                                        pending,
                                        eof,
                                    }
                                };
                                return Some((event, next));
                            }

                            if eof {
                                return Some((PushEvent::Closed, SseState::Finished));
                            }

                            match body.next().await {
                                Some(Ok(bytes)) => {
                                    pending.extend(parser.feed(&bytes));
                                    SseState::Read {
                                        body,
                                        parser,
                                        pending,
                                        eof: false,
                                    }
                                }
                                Some(Err(error)) => {
                                    return Some((
                                        PushEvent::Error(error.to_string()),
                                        SseState::Finished,
                                    ));
                                }
                                None => {
                                    pending.extend(parser.finish());
                                    SseState::Read {
                                        body,
                                        parser,
                                        pending,
                                        eof: true,
                                    }
                                }
                            }
                        }
                    };
                }
            },
        ))
    }
}

/// Incremental `text/event-stream` decoder.
///
/// `data: [DONE]` and `event: done` complete the stream, `event: error` fails it, every other
/// dispatched event is one chunk.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<PushEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw_line = self.buffer.drain(..=line_end).collect::<Vec<_>>();
            let line = String::from_utf8_lossy(&raw_line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }

        events
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Vec<PushEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        if let Some(event) = self.dispatch() {
            events.push(event);
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<PushEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data_lines.push(value.to_string()),
            "event" => self.event_name = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<PushEvent> {
        let event_name = self.event_name.take();
        if self.data_lines.is_empty() && event_name.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data_lines).join("\n");

        match event_name.as_deref() {
            Some("error") => Some(PushEvent::Error(data)),
            Some("done") => Some(PushEvent::Done),
            _ if data == "[DONE]" => Some(PushEvent::Done),
            _ if data.is_empty() => None,
            _ => Some(PushEvent::Message(data)),
        }
    }
}
