use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use relaydexing::webhooks::WebhookPayload;
use relaydexing::{WebhookTransport, WebhookTransportError};

/// Records every request; the first `failures` requests get a 503
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<(String, WebhookPayload)>>,
    failures_left: AtomicU32,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: u32) -> Self {
        Self {
            requests: Mutex::new(vec![]),
            failures_left: AtomicU32::new(failures),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    pub fn get_requests(&self) -> Vec<(String, WebhookPayload)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl WebhookTransport for RecordingTransport {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<(), WebhookTransportError> {
        self.requests.lock().unwrap().push((url.to_string(), payload.clone()));

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();

        if failed {
            Err(WebhookTransportError::Status(503))
        } else {
            Ok(())
        }
    }
}
