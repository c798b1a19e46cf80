use std::sync::Arc;

use charla_storage::{InputHistory, Recall};
use charla_transport::{
    ChatRequest, ChatTransport, CorrelationId, CorrelationIdGenerator, ExchangeEvent,
    ExchangeEventStream, ExchangeHandle, ExchangeId, ExchangePayload, Settlement,
};
use tokio::task::JoinHandle;

use crate::message::{ChatMessage, DraftMessage, MessageId, SessionState, SessionTransition};

const DELIVERY_FAILURE_PREFIX: &str = "The message could not be delivered";

/// What changed after one exchange event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    StreamOpened,
    DraftUpdated { content: String },
    FallbackEngaged { reason: String },
    MessageAppended(MessageId),
}

struct ActiveExchange {
    user_correlation_id: CorrelationId,
    stream: ExchangeEventStream,
    worker: JoinHandle<()>,
}

/// One conversation: the ordered message log plus the single in-flight exchange.
///
/// All mutation happens through `&mut self`; the exchange worker runs as a tokio task and
/// reaches the log only through events that [`ChatSession::apply`] accepts.
pub struct ChatSession {
    transport: ChatTransport,
    history: InputHistory,
    ids: Arc<dyn CorrelationIdGenerator>,
    messages: Vec<ChatMessage>,
    state: SessionState,
    draft: Option<DraftMessage>,
    active: Option<ActiveExchange>,
    next_message_id: u64,
    next_exchange_id: u64,
    initialized: bool,
}

impl ChatSession {
    /// Creates an idle conversation with an empty log.
    pub fn new(transport: ChatTransport, history: InputHistory) -> Self {
        let ids = transport.id_generator();
        Self {
            transport,
            history,
            ids,
            messages: Vec::new(),
            state: SessionState::Idle,
            draft: None,
            active: None,
            next_message_id: MessageId::WELCOME.0 + 1,
            next_exchange_id: 1,
            initialized: false,
        }
    }

    /// Prepends the welcome message. Later calls are no-ops.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        let welcome = ChatMessage::welcome(self.transport.config().welcome_text());
        self.messages.insert(0, welcome);
    }

    pub fn can_send(&self, text: &str) -> bool {
        self.state.is_idle() && !text.trim().is_empty()
    }

    /// Appends the user turn and starts its exchange.
    ///
    /// Returns `None` when the text is blank or another exchange is still in flight. Must be
    /// called inside a tokio runtime since the exchange worker is spawned onto it.
    pub fn submit(&mut self, text: &str) -> Option<ExchangeId> {
        if !self.can_send(text) {
            return None;
        }

        let exchange_id = self.alloc_exchange_id();
        let state = self
            .state
            .apply(SessionTransition::Start(exchange_id))
            .ok()?;

        let user_correlation_id = self.ids.generate();
        let user_message_id = self.alloc_message_id();
        self.messages.push(ChatMessage::user(
            user_message_id,
            text,
            user_correlation_id.clone(),
        ));
        self.state = state;
        self.history.record(text);

        tracing::debug!(
            exchange_id = %exchange_id,
            correlation_id = %user_correlation_id,
            streaming = self.transport.streaming_enabled(),
            "submitting chat message"
        );

        let request = ChatRequest::new(text)
            .with_session_id(self.transport.config().session_id.clone());
        match self
            .transport
            .exchange(exchange_id, request, user_correlation_id.clone())
        {
            Ok(ExchangeHandle { stream, worker }) => {
                self.active = Some(ActiveExchange {
                    user_correlation_id,
                    stream,
                    worker: tokio::spawn(worker),
                });
            }
            Err(error) => {
                self.append_failure(exchange_id, &user_correlation_id, error.to_string());
            }
        }

        Some(exchange_id)
    }

    /// Awaits and applies the next event of the in-flight exchange.
    ///
    /// Returns `None` once nothing is in flight.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            let active = self.active.as_mut()?;
            let exchange_id = active.stream.exchange_id();

            let Some(event) = active.stream.recv().await else {
                let user_correlation_id = active.user_correlation_id.clone();
                tracing::error!(
                    exchange_id = %exchange_id,
                    "exchange worker stopped without settling"
                );
                let id = self.append_failure(
                    exchange_id,
                    &user_correlation_id,
                    "the exchange ended without a reply".to_string(),
                );
                return id.map(SessionUpdate::MessageAppended);
            };

            if let Some(update) = self.apply(event) {
                return Some(update);
            }
        }
    }

    /// Drives the in-flight exchange until it settles and returns the appended message.
    pub async fn settle(&mut self) -> Option<MessageId> {
        while let Some(update) = self.next_update().await {
            if let SessionUpdate::MessageAppended(id) = update {
                return Some(id);
            }
        }
        None
    }

    /// Applies one exchange event. Events for another exchange or a closed session are dropped.
    pub fn apply(&mut self, event: ExchangeEvent) -> Option<SessionUpdate> {
        let exchange_id = event.exchange_id;
        if !self.state.accepts_exchange_event(exchange_id) {
            tracing::debug!(
                exchange_id = %exchange_id,
                state = ?self.state,
                "discarding stale exchange event"
            );
            return None;
        }

        match event.payload {
            ExchangePayload::Opened => {
                self.draft = Some(DraftMessage::new(exchange_id));
                Some(SessionUpdate::StreamOpened)
            }
            ExchangePayload::Chunk(chunk) => {
                let draft = self
                    .draft
                    .get_or_insert_with(|| DraftMessage::new(exchange_id));
                draft.content.push_str(&chunk);
                Some(SessionUpdate::DraftUpdated {
                    content: draft.content.clone(),
                })
            }
            ExchangePayload::FallbackEngaged { reason } => {
                // The partial reply never reaches the log.
                self.draft = None;
                tracing::debug!(exchange_id = %exchange_id, %reason, "conversation fell back to REST");
                Some(SessionUpdate::FallbackEngaged { reason })
            }
            ExchangePayload::Settled(Ok(settlement)) => self
                .append_reply(exchange_id, settlement)
                .map(SessionUpdate::MessageAppended),
            ExchangePayload::Settled(Err(error)) => {
                let user_correlation_id = self.active_user_correlation_id()?;
                self.append_failure(exchange_id, &user_correlation_id, error.to_string())
                    .map(SessionUpdate::MessageAppended)
            }
        }
    }

    /// Tears the conversation down. The open stream is cancelled and later events are ignored.
    pub fn close(&mut self) {
        if let Some(exchange_id) = self.state.active_exchange() {
            tracing::debug!(exchange_id = %exchange_id, "cancelling in-flight exchange");
        }
        if let Some(mut active) = self.active.take() {
            active.stream.cancel();
            active.worker.abort();
        }

        self.draft = None;
        if let Ok(state) = self.state.apply(SessionTransition::Close) {
            self.state = state;
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn draft(&self) -> Option<&DraftMessage> {
        self.draft.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transport(&self) -> &ChatTransport {
        &self.transport
    }

    pub fn history(&self) -> &InputHistory {
        &self.history
    }

    pub fn recall_previous(&mut self) -> Option<String> {
        self.history.navigate_back()
    }

    pub fn recall_next(&mut self) -> Option<Recall> {
        self.history.navigate_forward()
    }

    fn append_reply(&mut self, exchange_id: ExchangeId, settlement: Settlement) -> Option<MessageId> {
        let state = self
            .state
            .apply(SessionTransition::Settle(exchange_id))
            .ok()?;

        let Settlement { response, delivery } = settlement;
        let id = self.alloc_message_id();
        tracing::info!(
            exchange_id = %exchange_id,
            correlation_id = %response.correlation_id,
            delivery = delivery.as_str(),
            "chat exchange settled"
        );
        self.messages.push(ChatMessage::assistant_reply(
            id,
            response.response,
            response.correlation_id,
            delivery,
        ));
        self.finish_exchange(state);
        Some(id)
    }

    fn append_failure(
        &mut self,
        exchange_id: ExchangeId,
        user_correlation_id: &CorrelationId,
        description: String,
    ) -> Option<MessageId> {
        let state = self
            .state
            .apply(SessionTransition::Settle(exchange_id))
            .ok()?;

        let id = self.alloc_message_id();
        tracing::error!(
            exchange_id = %exchange_id,
            correlation_id = %user_correlation_id,
            error = %description,
            "chat exchange failed"
        );
        self.messages.push(ChatMessage::system_error(
            id,
            format!("{DELIVERY_FAILURE_PREFIX}: {description}"),
            user_correlation_id.clone(),
        ));
        self.finish_exchange(state);
        Some(id)
    }

    fn finish_exchange(&mut self, state: SessionState) {
        self.state = state;
        self.draft = None;
        self.active = None;
    }

    fn active_user_correlation_id(&self) -> Option<CorrelationId> {
        self.active
            .as_ref()
            .map(|active| active.user_correlation_id.clone())
    }

    fn alloc_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id = self.next_message_id.saturating_add(1);
        id
    }

    fn alloc_exchange_id(&mut self) -> ExchangeId {
        let id = ExchangeId::new(self.next_exchange_id);
        self.next_exchange_id = self.next_exchange_id.saturating_add(1);
        id
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.worker.abort();
        }
    }
}
