use std::time::SystemTime;

use charla_transport::{CorrelationId, Delivery, ExchangeId};

/// Stable identifier for one message, monotonic by creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Reserved for the welcome message so it sorts before every user turn.
    pub const WELCOME: MessageId = MessageId(0);

    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One appended turn. Never mutated after it enters the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: SystemTime,
    pub correlation_id: Option<CorrelationId>,
    /// Set on assistant replies produced by an exchange.
    pub delivery: Option<Delivery>,
}

impl ChatMessage {
    /// Creates a message stamped with the current time.
    pub fn new(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: SystemTime::now(),
            correlation_id: None,
            delivery: None,
        }
    }

    /// Creates a user turn tagged with its request-side correlation id.
    pub fn user(id: MessageId, content: impl Into<String>, correlation_id: CorrelationId) -> Self {
        Self::new(id, Role::User, content).with_correlation_id(correlation_id)
    }

    /// Creates an assistant reply carrying the response-side correlation id.
    pub fn assistant_reply(
        id: MessageId,
        content: impl Into<String>,
        correlation_id: CorrelationId,
        delivery: Delivery,
    ) -> Self {
        let mut message = Self::new(id, Role::Assistant, content).with_correlation_id(correlation_id);
        message.delivery = Some(delivery);
        message
    }

    /// Creates a system message describing a failed exchange.
    pub fn system_error(
        id: MessageId,
        content: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self::new(id, Role::System, content).with_correlation_id(correlation_id)
    }

    /// Creates the welcome message; it has no correlation id.
    pub fn welcome(content: impl Into<String>) -> Self {
        Self::new(MessageId::WELCOME, Role::Assistant, content)
    }

    fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// In-progress assistant reply built from stream chunks, kept outside the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftMessage {
    pub exchange_id: ExchangeId,
    pub content: String,
}

impl DraftMessage {
    /// Creates an empty draft for one exchange.
    pub fn new(exchange_id: ExchangeId) -> Self {
        Self {
            exchange_id,
            content: String::new(),
        }
    }
}

/// Send lifecycle of one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Sending(ExchangeId),
    Closed,
}

/// State transition input for the send lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    Start(ExchangeId),
    Settle(ExchangeId),
    Close,
}

/// Rejection reason for illegal send transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransitionRejection {
    AlreadySending {
        active: ExchangeId,
        attempted: ExchangeId,
    },
    NoActiveExchange,
    ExchangeMismatch {
        active: ExchangeId,
        attempted: ExchangeId,
    },
    Closed,
}

pub type SessionTransitionResult = Result<SessionState, SessionTransitionRejection>;

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns the in-flight exchange if and only if state is `Sending`.
    pub fn active_exchange(&self) -> Option<ExchangeId> {
        match self {
            Self::Sending(exchange_id) => Some(*exchange_id),
            Self::Idle | Self::Closed => None,
        }
    }

    /// Returns true when an incoming event belongs to the in-flight exchange.
    pub fn accepts_exchange_event(&self, exchange_id: ExchangeId) -> bool {
        matches!(self, Self::Sending(active) if *active == exchange_id)
    }

    /// Applies one transition deterministically.
    ///
    /// `Closed` is terminal: every transition out of it is rejected, and `Close` itself is
    /// accepted from any state.
    pub fn apply(&self, transition: SessionTransition) -> SessionTransitionResult {
        match transition {
            SessionTransition::Start(exchange_id) => self.apply_start(exchange_id),
            SessionTransition::Settle(exchange_id) => self.apply_settle(exchange_id),
            SessionTransition::Close => Ok(Self::Closed),
        }
    }

    fn apply_start(&self, exchange_id: ExchangeId) -> SessionTransitionResult {
        match self {
            Self::Idle => Ok(Self::Sending(exchange_id)),
            Self::Sending(active) => Err(SessionTransitionRejection::AlreadySending {
                active: *active,
                attempted: exchange_id,
            }),
            Self::Closed => Err(SessionTransitionRejection::Closed),
        }
    }

    fn apply_settle(&self, exchange_id: ExchangeId) -> SessionTransitionResult {
        match self {
            Self::Sending(active) if *active == exchange_id => Ok(Self::Idle),
            Self::Sending(active) => Err(SessionTransitionRejection::ExchangeMismatch {
                active: *active,
                attempted: exchange_id,
            }),
            Self::Idle => Err(SessionTransitionRejection::NoActiveExchange),
            Self::Closed => Err(SessionTransitionRejection::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_settle_returns_to_idle() {
        let exchange = ExchangeId::new(1);
        let state = SessionState::Idle
            .apply(SessionTransition::Start(exchange))
            .unwrap();

        assert_eq!(state, SessionState::Sending(exchange));
        assert!(state.accepts_exchange_event(exchange));
        assert_eq!(
            state.apply(SessionTransition::Settle(exchange)),
            Ok(SessionState::Idle)
        );
    }

    #[test]
    fn second_start_while_sending_is_rejected() {
        let state = SessionState::Sending(ExchangeId::new(1));

        assert_eq!(
            state.apply(SessionTransition::Start(ExchangeId::new(2))),
            Err(SessionTransitionRejection::AlreadySending {
                active: ExchangeId::new(1),
                attempted: ExchangeId::new(2),
            })
        );
    }

    #[test]
    fn stale_settle_is_rejected() {
        let state = SessionState::Sending(ExchangeId::new(2));

        assert!(!state.accepts_exchange_event(ExchangeId::new(1)));
        assert!(matches!(
            state.apply(SessionTransition::Settle(ExchangeId::new(1))),
            Err(SessionTransitionRejection::ExchangeMismatch { .. })
        ));
        assert_eq!(
            SessionState::Idle.apply(SessionTransition::Settle(ExchangeId::new(1))),
            Err(SessionTransitionRejection::NoActiveExchange)
        );
    }

    #[test]
    fn closed_is_terminal() {
        let state = SessionState::Sending(ExchangeId::new(1))
            .apply(SessionTransition::Close)
            .unwrap();

        assert!(state.is_closed());
        assert!(!state.accepts_exchange_event(ExchangeId::new(1)));
        assert_eq!(
            state.apply(SessionTransition::Start(ExchangeId::new(2))),
            Err(SessionTransitionRejection::Closed)
        );
    }
}
