use std::fmt;

use uuid::Uuid;

/// Opaque token tagging one request or one response of an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Creates a correlation id from a raw token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Source of correlation ids. Uniqueness is required, unpredictability is not.
pub trait CorrelationIdGenerator: Send + Sync {
    fn generate(&self) -> CorrelationId;
}

/// Random v4 UUIDs rendered without hyphens.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCorrelationIds;

impl CorrelationIdGenerator for RandomCorrelationIds {
    fn generate(&self) -> CorrelationId {
        CorrelationId(Uuid::new_v4().simple().to_string())
    }
}

/// Stable identifier for one exchange between a conversation and the transport.
///
/// Every submit allocates a new one so late events from an abandoned exchange can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(pub u64);

impl ExchangeId {
    /// Creates a typed exchange identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
