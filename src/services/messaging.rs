//! Outbound multimedia message relay.
//!
//! Forwards a send request to a Twilio-style REST endpoint. Only one
//! recipient is ever allowed; delivery itself is the provider's business.

use serde::Deserialize;
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Clone)]
pub struct MessagingConfig {
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub allowed_recipient: String,
}

impl fmt::Debug for MessagingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingConfig")
            .field("api_base", &self.api_base)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_number", &self.from_number)
            .field("allowed_recipient", &self.allowed_recipient)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("messaging is not configured")]
    NotConfigured,
    #[error("recipient is not allowed")]
    RecipientNotAllowed,
    #[error("provider rejected the message ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct ProviderMessage {
    sid: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: Option<String>,
}

/// Provider acknowledgement of a queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: Option<String>,
    pub status: Option<String>,
}

#[derive(Clone)]
pub struct MessagingRelay {
    client: reqwest::Client,
    config: Option<MessagingConfig>,
}

/// Keep digits and a leading `+` so formatting differences don't matter.
pub fn normalize_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') {
        format!("+{digits}")
    } else {
        digits
    }
}

impl MessagingRelay {
    pub fn new(config: Option<MessagingConfig>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Check `to` against the allow-list without sending anything.
    pub fn authorize(&self, to: &str) -> Result<&MessagingConfig, RelayError> {
        let config = self.config.as_ref().ok_or(RelayError::NotConfigured)?;
        let wanted = normalize_number(&config.allowed_recipient);
        if wanted.is_empty() || normalize_number(to) != wanted {
            warn!("send refused for recipient outside the allow-list");
            return Err(RelayError::RecipientNotAllowed);
        }
        Ok(config)
    }

    pub async fn send(
        &self,
        to: &str,
        media_url: &str,
        body: &str,
    ) -> Result<SentMessage, RelayError> {
        let config = self.authorize(to)?;
        let recipient = normalize_number(to);
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            config.api_base.trim_end_matches('/'),
            config.account_sid
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&config.account_sid, Some(&config.auth_token))
            .form(&[
                ("To", recipient.as_str()),
                ("From", config.from_number.as_str()),
                ("Body", body),
                ("MediaUrl", media_url),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ProviderError>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| status.to_string());
            warn!(status = status.as_u16(), "provider rejected message: {}", message);
            return Err(RelayError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let sent = response.json::<ProviderMessage>().await?;
        info!(sid = ?sent.sid, "message queued with provider");
        Ok(SentMessage {
            id: sent.sid,
            status: sent.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> MessagingRelay {
        MessagingRelay::new(Some(MessagingConfig {
            api_base: "http://127.0.0.1:9".into(),
            account_sid: "AC123".into(),
            auth_token: "secret".into(),
            from_number: "+15550000000".into(),
            allowed_recipient: "+1 (555) 123-4567".into(),
        }))
    }

    #[test]
    fn debug_hides_token() {
        let relay = relay();
        let printed = format!("{:?}", relay.config);
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn normalizes_numbers() {
        assert_eq!(normalize_number(" +1 (555) 123-4567 "), "+15551234567");
        assert_eq!(normalize_number("555.123.4567"), "5551234567");
    }

    #[test]
    fn only_the_allow_listed_recipient_passes() {
        let relay = relay();
        assert!(relay.authorize("+15551234567").is_ok());
        assert!(matches!(
            relay.authorize("+15559999999"),
            Err(RelayError::RecipientNotAllowed)
        ));
        assert!(matches!(
            relay.authorize("15551234567"),
            Err(RelayError::RecipientNotAllowed)
        ));
    }

    #[tokio::test]
    async fn unconfigured_relay_refuses() {
        let relay = MessagingRelay::new(None);
        assert!(!relay.is_configured());
        assert!(matches!(
            relay.send("+15551234567", "http://x/y.png", "hi").await,
            Err(RelayError::NotConfigured)
        ));
    }
}
