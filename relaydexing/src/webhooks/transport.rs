use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use super::WebhookPayload;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, thiserror::Error)]
pub enum WebhookTransportError {
    #[error("endpoint responded with status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Outbound delivery of one webhook request. Any non-2xx response is an error.
#[async_trait::async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<(), WebhookTransportError>;
}

#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, WebhookTransportError> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<(), WebhookTransportError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(IDEMPOTENCY_KEY_HEADER, payload.id.as_str())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WebhookTransportError::Status(status.as_u16()))
        }
    }
}
