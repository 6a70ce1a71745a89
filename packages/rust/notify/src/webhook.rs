//! Incoming-webhook sink.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use tenderwatch_shared::{Result, TenderError};

use crate::render::NotificationPayload;

/// User-Agent string for webhook requests.
const USER_AGENT: &str = concat!("tenderwatch/", env!("CARGO_PKG_VERSION"));

/// Posts rendered payloads to a chat webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a notifier for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TenderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Send one payload. Any non-2xx answer is an error.
    #[instrument(skip_all)]
    pub async fn post(&self, payload: &NotificationPayload) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| TenderError::Notification(format!("webhook request failed: {e}")))?;

        let status = response.status();
        debug!(status = status.as_u16(), "webhook responded");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(TenderError::Notification(format!(
                "webhook returned HTTP {status}: {excerpt}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Block, TextKind, TextObject};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> NotificationPayload {
        NotificationPayload {
            text: "fallback".into(),
            blocks: vec![
                Block::Divider,
                Block::Section {
                    text: TextObject {
                        kind: TextKind::Mrkdwn,
                        text: "body".into(),
                    },
                },
                Block::Divider,
            ],
        }
    }

    #[tokio::test]
    async fn posts_json_payload() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hooks/T000/B000"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "text": "fallback",
                "blocks": [
                    {"type": "divider"},
                    {"type": "section", "text": {"type": "mrkdwn", "text": "body"}},
                    {"type": "divider"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hooks/T000/B000", server.uri()), 10).unwrap();
        notifier.post(&payload()).await.expect("post succeeds");
    }

    #[tokio::test]
    async fn rejected_post_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_blocks"))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri(), 10).unwrap();
        let err = notifier.post(&payload()).await.unwrap_err();
        assert!(matches!(err, TenderError::Notification(_)));
        assert!(err.to_string().contains("invalid_blocks"));
    }
}
