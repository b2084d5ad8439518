use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Email,
    None,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
            Self::None => "none",
        }
    }
}

/// An out-of-band message provider (SMS gateway, mail relay, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, destination: &str, subject: &str, body: &str) -> Result<()>;
}

/// Development provider that writes messages to the log instead of sending them.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    channel: Channel,
}

impl LogNotifier {
    pub fn sms() -> Self {
        Self { channel: Channel::Sms }
    }

    pub fn email() -> Self {
        Self { channel: Channel::Email }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, destination: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!(
            channel = self.channel.as_str(),
            to = destination,
            subject,
            body,
            "message delivered to log"
        );
        Ok(())
    }
}

/// Where a message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub channel: Channel,
    pub destination_hint: Option<String>,
}

/// Sends to the admin by SMS first and falls back to email.
#[derive(Clone)]
pub struct Delivery {
    sms: Arc<dyn Notifier>,
    sms_to: String,
    email: Arc<dyn Notifier>,
    email_to: String,
}

impl Delivery {
    pub fn new(
        sms: Arc<dyn Notifier>,
        sms_to: impl Into<String>,
        email: Arc<dyn Notifier>,
        email_to: impl Into<String>,
    ) -> Self {
        Self {
            sms,
            sms_to: sms_to.into(),
            email,
            email_to: email_to.into(),
        }
    }

    /// Tries every channel in order. Never fails; a total failure is logged and
    /// reported as `Channel::None`.
    pub async fn deliver(&self, subject: &str, body: &str) -> DeliveryOutcome {
        let routes = [(&self.sms, &self.sms_to), (&self.email, &self.email_to)];

        for (notifier, destination) in routes {
            let channel = notifier.channel();
            if destination.is_empty() {
                tracing::debug!(channel = channel.as_str(), "no destination configured, skipping");
                continue;
            }
            match notifier.send(destination, subject, body).await {
                Ok(()) => {
                    return DeliveryOutcome {
                        channel,
                        destination_hint: Some(mask_destination(destination)),
                    };
                }
                Err(e) => {
                    tracing::warn!(channel = channel.as_str(), error = %e, "delivery failed, trying next channel");
                }
            }
        }

        tracing::error!(subject, "message could not be delivered on any channel");
        DeliveryOutcome {
            channel: Channel::None,
            destination_hint: None,
        }
    }

    /// Sends through the email channel only.
    pub async fn email(&self, subject: &str, body: &str) -> Result<()> {
        if self.email_to.is_empty() {
            return Err(anyhow!("no email destination configured"));
        }
        self.email.send(&self.email_to, subject, body).await
    }
}

/// Hides all but enough of a phone number or address to recognise it.
pub fn mask_destination(destination: &str) -> String {
    if let Some((local, domain)) = destination.split_once('@') {
        let first: String = local.chars().take(1).collect();
        return format!("{first}***@{domain}");
    }

    let digits: Vec<char> = destination.chars().filter(|c| c.is_ascii_digit()).collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("***{tail}")
}
