//! Access-token cache.
//!
//! The brokerage issues OAuth client-credential tokens valid for 24 h.
//! One `TokenCache` is shared by both segment loops; a cached token is
//! reused while its age stays under `TOKEN_TTL_SECS`, and refresh happens
//! behind a mutex so concurrent cycles cannot race two token requests.

use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::types::BotError;

/// Reuse window, just under the server-side 24 h expiry.
const TOKEN_TTL_SECS: i64 = 80_000;

#[derive(Clone)]
struct IssuedToken {
    value: String,
    issued_at: DateTime<Utc>,
}

impl IssuedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (now - self.issued_at).num_seconds() < TOKEN_TTL_SECS
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Process-wide token cache. Callers hold it behind an `Arc`.
pub struct TokenCache {
    http: Client,
    base_url: String,
    app_key: String,
    app_secret: SecretString,
    slot: Mutex<Option<IssuedToken>>,
}

impl TokenCache {
    pub fn new(http: Client, base_url: String, app_key: String, app_secret: SecretString) -> Self {
        Self {
            http,
            base_url,
            app_key,
            app_secret,
            slot: Mutex::new(None),
        }
    }

    /// Return a fresh bearer token, issuing a new one if the cached token
    /// is missing or near expiry. Holding the mutex across the refresh
    /// makes it single-flight: the second caller finds the new token.
    pub async fn acquire(&self) -> Result<String, BotError> {
        let mut slot = self.slot.lock().await;
        let now = Utc::now();

        if let Some(token) = slot.as_ref() {
            if token.is_fresh(now) {
                debug!("Reusing cached access token");
                return Ok(token.value.clone());
            }
        }

        let issued = self.issue().await?;
        let value = issued.value.clone();
        *slot = Some(issued);
        Ok(value)
    }

    /// Drop the cached token so the next `acquire` re-issues. Used when
    /// the brokerage starts rejecting the bearer before its nominal TTL.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    async fn issue(&self) -> Result<IssuedToken, BotError> {
        info!("Issuing new access token");

        let body = serde_json::json!({
            "grant_type": "client_credentials",
            "appkey": self.app_key,
            "appsecret": self.app_secret.expose_secret(),
        });

        let resp = self
            .http
            .post(format!("{}/oauth2/tokenP", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Auth(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BotError::Auth(format!("{status}: {text}")));
        }

        let parsed: TokenResponse = resp
            .json()
            .await
            .map_err(|e| BotError::Auth(format!("malformed token response: {e}")))?;

        Ok(IssuedToken {
            value: parsed.access_token,
            issued_at: Utc::now(),
        })
    }
}
