//! Discord webhook notifications.
//!
//! Fire-and-forget: delivery failures are logged and swallowed so a dead
//! webhook can never take down a trading cycle. Messages are prefixed per
//! segment so both feeds share one channel.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

use crate::types::Segment;

#[derive(Clone)]
pub struct Notifier {
    webhook_url: Option<String>,
    http: Client,
}

#[derive(Serialize)]
struct DiscordPayload<'a> {
    content: &'a str,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { webhook_url, http }
    }

    /// Alerts disabled entirely (no webhook configured).
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Deliver `text` to the webhook, prefixed for `segment`. Best-effort:
    /// never returns an error to the caller.
    pub async fn send(&self, segment: Segment, text: &str) {
        let Some(url) = self.webhook_url.as_deref() else {
            return;
        };

        let prefix = match segment {
            Segment::Domestic => "🇰🇷 ",
            Segment::Overseas => "🇺🇸 ",
        };
        let content = format!("{prefix}{text}");

        let result = self
            .http
            .post(url)
            .json(&DiscordPayload { content: &content })
            .send()
            .await;

        match result {
            Ok(resp) if !resp.status().is_success() => {
                warn!(status = %resp.status(), "Discord webhook refused message");
            }
            Err(e) => {
                warn!(error = %e, "Discord webhook delivery failed");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_notifier_is_a_noop() {
        let notifier = Notifier::disabled();
        // Must complete without error and without touching the network.
        notifier.send(Segment::Domestic, "hello").await;
    }

    #[tokio::test]
    async fn test_unreachable_webhook_never_raises() {
        let notifier = Notifier::new(Some("http://127.0.0.1:9/unroutable".to_string()));
        notifier.send(Segment::Overseas, "hello").await;
    }
}
