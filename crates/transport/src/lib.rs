//! Client-side transport for the BFF chat API.
//!
//! [`ChatTransport`] turns one user message into an authenticated exchange: a streaming
//! subscription when a push channel is configured, with a single REST fallback when the
//! stream fails, or a plain REST call otherwise.

pub mod config;
pub mod dto;
pub mod error;
pub mod exchange;
pub mod http;
pub mod ids;
pub mod phase;
pub mod push;
pub mod transport;

pub use config::{ChatConfig, DEFAULT_WELCOME_MESSAGE};
pub use dto::{ChatRequest, ChatResponse, ComponentHealth, HealthReport};
pub use error::{TransportError, TransportResult};
pub use exchange::{
    Delivery, ExchangeEvent, ExchangeEventStream, ExchangeHandle, ExchangePayload, ExchangeWorker,
    Settlement,
};
pub use http::{
    BoxFuture, HEADER_API_KEY, HEADER_CORRELATION_ID, HEADER_PROFILE, HEADER_ROLE, HttpClient,
    HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use ids::{CorrelationId, CorrelationIdGenerator, ExchangeId, RandomCorrelationIds};
pub use phase::{PhaseRejection, PhaseTransition, StreamPhase};
pub use push::{PushClient, PushEvent, PushStream, SseParser, SsePushClient};
pub use transport::ChatTransport;
