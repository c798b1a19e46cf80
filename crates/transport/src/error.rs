use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("chat config field '{field}' is required"))]
    InvalidConfig {
        stage: &'static str,
        field: &'static str,
    },
    #[snafu(display("chat message is empty"))]
    EmptyMessage { stage: &'static str },
    #[snafu(display("{}", describe_status(*status, code.as_deref(), detail.as_deref())))]
    Status {
        stage: &'static str,
        status: u16,
        code: Option<String>,
        detail: Option<String>,
    },
    #[snafu(display("stream connection failed on `{stage}`: {details}"))]
    Connection {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("backend response could not be read: {details}"))]
    MalformedResponse {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("failed to encode chat request"))]
    EncodeRequest {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("request failed on `{stage}`, {source}"))]
    Request {
        stage: &'static str,
        source: reqwest::Error,
    },
}

impl TransportError {
    /// HTTP status carried by a non-success response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Connection errors are recovered by the REST fallback and never settle an exchange.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

fn describe_status(status: u16, code: Option<&str>, detail: Option<&str>) -> String {
    let mut text = format!("backend returned status {status}");
    if let Some(code) = code {
        text.push_str(&format!(" ({code})"));
    }
    if let Some(detail) = detail.filter(|detail| !detail.trim().is_empty()) {
        text.push_str(&format!(": {}", detail.trim()));
    }
    text
}

pub type TransportResult<T> = Result<T, TransportError>;
