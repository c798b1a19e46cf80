use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::CorrelationId;

/// Body of `POST {endpoint}/api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatRequest {
    /// Creates a request without a session id.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
        }
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}

/// Normalized reply. `correlation_id` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub response: String,
    pub correlation_id: CorrelationId,
    pub intent: Option<String>,
    pub entities: BTreeMap<String, String>,
}

/// Reply as it arrives on the wire; every field but `response` may be missing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatResponseBody {
    pub response: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub entities: Option<BTreeMap<String, String>>,
}

/// Error payload the BFF attaches to non-success statuses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `GET {endpoint}/api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthReport {
    pub fn is_up(&self) -> bool {
        self.status.eq_ignore_ascii_case("up")
    }

    pub fn down_components(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|(_, component)| !component.status.eq_ignore_ascii_case("up"))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_missing_session_id() {
        let body = serde_json::to_string(&ChatRequest::new("Hola")).unwrap();
        assert_eq!(body, r#"{"message":"Hola"}"#);

        let body = serde_json::to_string(
            &ChatRequest::new("Hola").with_session_id(Some("s-1".to_string())),
        )
        .unwrap();
        assert_eq!(body, r#"{"message":"Hola","sessionId":"s-1"}"#);
    }

    #[test]
    fn response_body_accepts_optional_fields() {
        let body: ChatResponseBody = serde_json::from_str(
            r#"{"response":"ok","intent":"orders.get","entities":{"orderId":"42"}}"#,
        )
        .unwrap();

        assert_eq!(body.response, "ok");
        assert_eq!(body.correlation_id, None);
        assert_eq!(body.intent.as_deref(), Some("orders.get"));
        assert_eq!(
            body.entities.unwrap().get("orderId").map(String::as_str),
            Some("42")
        );
    }

    #[test]
    fn health_report_lists_down_components() {
        let report: HealthReport = serde_json::from_str(
            r#"{"status":"down","version":"1.0.0","components":{"ollama":{"status":"up","model":"llama3"},"odoo":{"status":"down","error":"timeout"}}}"#,
        )
        .unwrap();

        assert!(!report.is_up());
        assert_eq!(report.down_components(), vec!["odoo"]);
    }
}
