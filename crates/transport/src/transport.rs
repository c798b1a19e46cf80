use std::sync::Arc;

use futures::StreamExt;
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::config::ChatConfig;
use super::dto::{ChatRequest, ChatResponse, ChatResponseBody, ErrorBody, HealthReport};
use super::error::{
    ConnectionSnafu, EmptyMessageSnafu, EncodeRequestSnafu, MalformedResponseSnafu, StatusSnafu,
    TransportError, TransportResult,
};
use super::exchange::{
    Delivery, ExchangeEvent, ExchangeHandle, ExchangePayload, ExchangeWorker, Settlement,
    make_event_stream,
};
use super::http::{
    HEADER_API_KEY, HEADER_CORRELATION_ID, HEADER_PROFILE, HEADER_ROLE, HttpClient, HttpMethod,
    HttpRequest, HttpResponse,
};
use super::ids::{CorrelationId, CorrelationIdGenerator, ExchangeId, RandomCorrelationIds};
use super::phase::{PhaseTransition, StreamPhase};
use super::push::{PushClient, PushEvent};

const FRESH_ID_ATTEMPTS: usize = 8;
const ERROR_DETAIL_LIMIT: usize = 200;

enum StreamOutcome {
    Completed(Settlement),
    Failed(TransportError),
    Cancelled,
}

/// Executes "send message, get response" exchanges against the BFF.
#[derive(Clone)]
pub struct ChatTransport {
    config: Arc<ChatConfig>,
    http: Arc<dyn HttpClient>,
    push: Option<Arc<dyn PushClient>>,
    ids: Arc<dyn CorrelationIdGenerator>,
}

impl ChatTransport {
    /// Creates a REST-only transport after normalizing and validating `config`.
    pub fn new(config: ChatConfig, http: Arc<dyn HttpClient>) -> TransportResult<Self> {
        let config = config.normalized();
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            http,
            push: None,
            ids: Arc::new(RandomCorrelationIds),
        })
    }

    pub fn with_push_client(mut self, push: Arc<dyn PushClient>) -> Self {
        self.push = Some(push);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn CorrelationIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn id_generator(&self) -> Arc<dyn CorrelationIdGenerator> {
        self.ids.clone()
    }

    /// Streaming needs both a push client and a BFF-provided stream URL.
    pub fn streaming_enabled(&self) -> bool {
        self.push.is_some() && self.config.stream_url.is_some()
    }

    /// REST exchange with a freshly generated request-side correlation id.
    pub async fn send(&self, request: &ChatRequest) -> TransportResult<ChatResponse> {
        let request_id = self.ids.generate();
        self.send_with_correlation(request, &request_id).await
    }

    /// REST exchange tagged with the caller's request-side correlation id.
    pub async fn send_with_correlation(
        &self,
        request: &ChatRequest,
        request_id: &CorrelationId,
    ) -> TransportResult<ChatResponse> {
        let http_request = self.build_chat_request(&self.config.chat_url(), request, request_id)?;

        tracing::debug!(
            correlation_id = %request_id,
            url = %http_request.url,
            "sending chat request"
        );

        let response = self.http.send(http_request).await?;
        if !response.is_success() {
            let error = Self::status_error(&response);
            tracing::warn!(
                correlation_id = %request_id,
                status = response.status,
                error = %error,
                "chat request rejected by backend"
            );
            return Err(error);
        }

        self.normalize_response(&response, request_id)
    }

    pub async fn health(&self) -> TransportResult<HealthReport> {
        let request_id = self.ids.generate();
        let http_request = self.with_identity_headers(
            HttpRequest::new(HttpMethod::Get, self.config.health_url()),
            &request_id,
        );

        let response = self.http.send(http_request).await?;
        if !response.is_success() {
            return Err(Self::status_error(&response));
        }

        serde_json::from_str(&response.body).map_err(|error| {
            MalformedResponseSnafu {
                stage: "parse-health-response",
                details: error.to_string(),
            }
            .build()
        })
    }

    /// Prepares one exchange, streaming first when available and REST otherwise.
    pub fn exchange(
        &self,
        exchange_id: ExchangeId,
        request: ChatRequest,
        request_id: CorrelationId,
    ) -> TransportResult<ExchangeHandle> {
        ensure!(
            !request.message.trim().is_empty(),
            EmptyMessageSnafu {
                stage: "prepare-exchange",
            }
        );

        let (event_tx, stream, cancel_rx) = make_event_stream(exchange_id);
        let worker: ExchangeWorker = Box::pin(self.clone().run_exchange(
            exchange_id,
            request,
            request_id,
            event_tx,
            cancel_rx,
        ));

        Ok(ExchangeHandle { stream, worker })
    }

    fn build_chat_request(
        &self,
        url: &str,
        request: &ChatRequest,
        request_id: &CorrelationId,
    ) -> TransportResult<HttpRequest> {
        ensure!(
            !request.message.trim().is_empty(),
            EmptyMessageSnafu {
                stage: "build-chat-request",
            }
        );

        let body = serde_json::to_string(request).context(EncodeRequestSnafu {
            stage: "encode-chat-request",
        })?;

        Ok(self
            .with_identity_headers(HttpRequest::new(HttpMethod::Post, url), request_id)
            .with_json_body(body))
    }

    fn with_identity_headers(&self, request: HttpRequest, request_id: &CorrelationId) -> HttpRequest {
        request
            .with_header(HEADER_API_KEY, self.config.api_key.as_str())
            .with_header(HEADER_ROLE, self.config.role.as_str())
            .with_header(HEADER_PROFILE, self.config.profile.as_str())
            .with_header(HEADER_CORRELATION_ID, request_id.as_str())
    }

    fn normalize_response(
        &self,
        response: &HttpResponse,
        request_id: &CorrelationId,
    ) -> TransportResult<ChatResponse> {
        let body: ChatResponseBody = serde_json::from_str(&response.body).map_err(|error| {
            MalformedResponseSnafu {
                stage: "parse-chat-response",
                details: error.to_string(),
            }
            .build()
        })?;

        let correlation_id = match body
            .correlation_id
            .map(CorrelationId::from)
            .filter(|id| !id.is_empty())
        {
            Some(id) if &id != request_id => id,
            Some(id) => {
                tracing::warn!(
                    correlation_id = %id,
                    "backend echoed the request correlation id; substituting a fresh one"
                );
                self.fresh_response_id(request_id)
            }
            None => self.fresh_response_id(request_id),
        };

        Ok(ChatResponse {
            response: body.response,
            correlation_id,
            intent: body.intent.filter(|intent| !intent.trim().is_empty()),
            entities: body.entities.unwrap_or_default(),
        })
    }

    /// Response-side id generated independently of, and never equal to, the request-side id.
    fn fresh_response_id(&self, request_id: &CorrelationId) -> CorrelationId {
        for _ in 0..FRESH_ID_ATTEMPTS {
            let candidate = self.ids.generate();
            if !candidate.is_empty() && &candidate != request_id {
                return candidate;
            }
        }
        CorrelationId::new(format!("{request_id}.reply"))
    }

    fn status_error(response: &HttpResponse) -> TransportError {
        let parsed = serde_json::from_str::<ErrorBody>(&response.body).ok();
        let (code, detail) = match parsed {
            Some(body) => (body.code, body.message),
            None => {
                let raw = response.body.trim();
                let detail = (!raw.is_empty())
                    .then(|| raw.chars().take(ERROR_DETAIL_LIMIT).collect::<String>());
                (None, detail)
            }
        };

        StatusSnafu {
            stage: "chat-http-status",
            status: response.status,
            code,
            detail,
        }
        .build()
    }

    async fn run_exchange(
        self,
        exchange_id: ExchangeId,
        request: ChatRequest,
        request_id: CorrelationId,
        event_tx: mpsc::UnboundedSender<ExchangeEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let mut delivery = Delivery::Rest;

        if self.streaming_enabled() {
            match self
                .stream_exchange(exchange_id, &request, &request_id, &event_tx, &mut cancel_rx)
                .await
            {
                StreamOutcome::Completed(settlement) => {
                    tracing::info!(
                        exchange_id = %exchange_id,
                        correlation_id = %settlement.response.correlation_id,
                        "stream exchange settled"
                    );
                    let _ = event_tx.send(ExchangeEvent::new(
                        exchange_id,
                        ExchangePayload::Settled(Ok(settlement)),
                    ));
                    return;
                }
                StreamOutcome::Cancelled => return,
                StreamOutcome::Failed(error) if !error.is_connection() => {
                    tracing::error!(
                        exchange_id = %exchange_id,
                        correlation_id = %request_id,
                        error = %error,
                        "stream exchange failed"
                    );
                    let _ = event_tx.send(ExchangeEvent::new(
                        exchange_id,
                        ExchangePayload::Settled(Err(error)),
                    ));
                    return;
                }
                StreamOutcome::Failed(error) => {
                    tracing::warn!(
                        exchange_id = %exchange_id,
                        correlation_id = %request_id,
                        error = %error,
                        "stream failed before completion; falling back to REST"
                    );
                    let engaged = ExchangeEvent::new(
                        exchange_id,
                        ExchangePayload::FallbackEngaged {
                            reason: error.to_string(),
                        },
                    );
                    if event_tx.send(engaged).is_err() {
                        return;
                    }
                    delivery = Delivery::Fallback;
                }
            }
        }

        let result = tokio::select! {
            _ = &mut cancel_rx => {
                tracing::debug!(exchange_id = %exchange_id, "exchange cancelled during REST call");
                return;
            }
            result = self.send_with_correlation(&request, &request_id) => result,
        };

        match &result {
            Ok(response) => tracing::info!(
                exchange_id = %exchange_id,
                correlation_id = %response.correlation_id,
                delivery = delivery.as_str(),
                "exchange settled"
            ),
            Err(error) => tracing::error!(
                exchange_id = %exchange_id,
                correlation_id = %request_id,
                delivery = delivery.as_str(),
                error = %error,
                "exchange failed"
            ),
        }

        let _ = event_tx.send(ExchangeEvent::new(
            exchange_id,
            ExchangePayload::Settled(result.map(|response| Settlement { response, delivery })),
        ));
    }

    async fn stream_exchange(
        &self,
        exchange_id: ExchangeId,
        request: &ChatRequest,
        request_id: &CorrelationId,
        event_tx: &mpsc::UnboundedSender<ExchangeEvent>,
        cancel_rx: &mut oneshot::Receiver<()>,
    ) -> StreamOutcome {
        let (Some(push), Some(stream_url)) = (&self.push, &self.config.stream_url) else {
            return StreamOutcome::Failed(connection_error("streaming is not configured"));
        };

        let http_request = match self.build_chat_request(stream_url, request, request_id) {
            Ok(http_request) => http_request,
            Err(error) => return StreamOutcome::Failed(error),
        };

        let mut events = push.subscribe(http_request);
        let mut phase = StreamPhase::Connecting;
        let mut content = String::new();

        loop {
            let next = tokio::select! {
                _ = &mut *cancel_rx => {
                    // Dropping `events` closes the push subscription.
                    tracing::debug!(exchange_id = %exchange_id, "stream exchange cancelled");
                    return StreamOutcome::Cancelled;
                }
                next = events.next() => next,
            };

            let transition = match &next {
                Some(PushEvent::Open) => PhaseTransition::Open,
                Some(PushEvent::Message(_)) => PhaseTransition::Chunk,
                Some(PushEvent::Done) => PhaseTransition::Complete,
                Some(PushEvent::Error(message)) => PhaseTransition::Fail(message.clone()),
                Some(PushEvent::Closed) | None => PhaseTransition::Close,
            };

            phase = match phase.apply(transition) {
                Ok(next_phase) => next_phase,
                Err(rejection) => return StreamOutcome::Failed(connection_error(rejection)),
            };
            tracing::trace!(exchange_id = %exchange_id, phase = ?phase, "stream phase advanced");

            let payload = match next {
                Some(PushEvent::Open) => ExchangePayload::Opened,
                Some(PushEvent::Message(chunk)) => {
                    content.push_str(&chunk);
                    ExchangePayload::Chunk(chunk)
                }
                Some(PushEvent::Done) => {
                    let response = ChatResponse {
                        response: std::mem::take(&mut content),
                        correlation_id: self.fresh_response_id(request_id),
                        intent: None,
                        entities: Default::default(),
                    };
                    return StreamOutcome::Completed(Settlement {
                        response,
                        delivery: Delivery::Streamed,
                    });
                }
                Some(PushEvent::Error(message)) => {
                    if let Ok(closed) = phase.apply(PhaseTransition::Close) {
                        tracing::trace!(exchange_id = %exchange_id, phase = ?closed, "stream closed");
                    }
                    return StreamOutcome::Failed(connection_error(message));
                }
                // `Close` before `Done` was already rejected by the phase machine.
                Some(PushEvent::Closed) | None => {
                    return StreamOutcome::Failed(connection_error("stream closed"));
                }
            };

            if event_tx
                .send(ExchangeEvent::new(exchange_id, payload))
                .is_err()
            {
                return StreamOutcome::Cancelled;
            }
        }
    }
}

fn connection_error(details: impl ToString) -> TransportError {
    ConnectionSnafu {
        stage: "stream-exchange",
        details: details.to_string(),
    }
    .build()
}
