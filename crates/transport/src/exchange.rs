use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};

use super::dto::ChatResponse;
use super::error::TransportError;
use super::ids::ExchangeId;

pub type ExchangeWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// How a settled reply reached the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    Rest,
    Streamed,
    /// REST reply served after the stream failed.
    Fallback,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Rest => "rest",
            Delivery::Streamed => "streamed",
            Delivery::Fallback => "fallback",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Delivery::Fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub response: ChatResponse,
    pub delivery: Delivery,
}

/// Transport-side progress of one exchange.
#[derive(Debug)]
pub enum ExchangePayload {
    Opened,
    Chunk(String),
    FallbackEngaged { reason: String },
    Settled(Result<Settlement, TransportError>),
}

#[derive(Debug)]
pub struct ExchangeEvent {
    pub exchange_id: ExchangeId,
    pub payload: ExchangePayload,
}

impl ExchangeEvent {
    /// Creates an event tagged with its exchange.
    pub fn new(exchange_id: ExchangeId, payload: ExchangePayload) -> Self {
        Self {
            exchange_id,
            payload,
        }
    }
}

pub struct ExchangeEventStream {
    exchange_id: ExchangeId,
    events: mpsc::UnboundedReceiver<ExchangeEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// Receiver half plus the worker that feeds it; the caller decides where the worker runs.
pub struct ExchangeHandle {
    pub stream: ExchangeEventStream,
    pub worker: ExchangeWorker,
}

impl ExchangeEventStream {
    pub(crate) fn new(
        exchange_id: ExchangeId,
        events: mpsc::UnboundedReceiver<ExchangeEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            exchange_id,
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn exchange_id(&self) -> ExchangeId {
        self.exchange_id
    }

    pub async fn recv(&mut self) -> Option<ExchangeEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ExchangeEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for ExchangeEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

pub(crate) fn make_event_stream(
    exchange_id: ExchangeId,
) -> (
    mpsc::UnboundedSender<ExchangeEvent>,
    ExchangeEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        ExchangeEventStream::new(exchange_id, event_rx, cancel_tx),
        cancel_rx,
    )
}
