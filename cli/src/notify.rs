use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use larder_core::grocery::OutboundMessage;
use larder_core::models::Channel;
use larder_core::service::Delivery;

use crate::config::ApiSettings;
use crate::spoonacular::http_client;

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const TWILIO_BASE_URL: &str = "https://api.twilio.com/2010-04-01";

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, to: &str, message: &OutboundMessage) -> Result<()>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()>;
}

pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl SendGridMailer {
    pub fn new(api_key: String, from: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key,
            from,
        })
    }
}

fn sendgrid_payload(from: &str, to: &str, message: &OutboundMessage) -> serde_json::Value {
    serde_json::json!({
        "personalizations": [{ "to": [{ "email": to }] }],
        "from": { "email": from },
        "subject": message.subject,
        "content": [
            { "type": "text/plain", "value": message.text },
            { "type": "text/html", "value": message.html },
        ],
    })
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send_email(&self, to: &str, message: &OutboundMessage) -> Result<()> {
        self.client
            .post(SENDGRID_URL)
            .bearer_auth(&self.api_key)
            .json(&sendgrid_payload(&self.from, to, message))
            .send()
            .await
            .context("Failed to reach SendGrid")?
            .error_for_status()
            .context("SendGrid rejected the message")?;
        tracing::info!(subject = %message.subject, "Sent grocery list email");
        Ok(())
    }
}

pub struct TwilioSms {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioSms {
    pub fn new(account_sid: String, auth_token: String, from: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            account_sid,
            auth_token,
            from,
        })
    }
}

fn twilio_form<'a>(from: &'a str, to: &'a str, body: &'a str) -> [(&'static str, &'a str); 3] {
    [("To", to), ("From", from), ("Body", body)]
}

#[async_trait]
impl SmsSender for TwilioSms {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        let url = format!(
            "{TWILIO_BASE_URL}/Accounts/{}/Messages.json",
            self.account_sid
        );
        self.client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&twilio_form(&self.from, to, body))
            .send()
            .await
            .context("Failed to reach Twilio")?
            .error_for_status()
            .context("Twilio rejected the message")?;
        tracing::info!("Sent grocery list SMS");
        Ok(())
    }
}

/// Stand-in used when a channel has no credentials: the message is logged
/// instead of sent.
pub struct LogOnlyNotifier;

#[async_trait]
impl Mailer for LogOnlyNotifier {
    async fn send_email(&self, to: &str, message: &OutboundMessage) -> Result<()> {
        tracing::info!(to, subject = %message.subject, body = %message.text, "Email delivery not configured; logging message");
        Ok(())
    }
}

#[async_trait]
impl SmsSender for LogOnlyNotifier {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        tracing::info!(to, body, "SMS delivery not configured; logging message");
        Ok(())
    }
}

/// Routes a prepared delivery to the sender for its channel.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    sms: Arc<dyn SmsSender>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, sms: Arc<dyn SmsSender>) -> Self {
        Self { mailer, sms }
    }

    pub fn from_settings(settings: &ApiSettings) -> Result<Self> {
        let mailer: Arc<dyn Mailer> = match (&settings.sendgrid_key, &settings.mail_from) {
            (Some(key), Some(from)) => Arc::new(SendGridMailer::new(key.clone(), from.clone())?),
            _ => {
                tracing::warn!("SendGrid credentials missing; grocery emails will only be logged");
                Arc::new(LogOnlyNotifier)
            }
        };
        let sms: Arc<dyn SmsSender> = match (
            &settings.twilio_sid,
            &settings.twilio_token,
            &settings.twilio_from,
        ) {
            (Some(sid), Some(token), Some(from)) => Arc::new(TwilioSms::new(
                sid.clone(),
                token.clone(),
                from.clone(),
            )?),
            _ => {
                tracing::warn!("Twilio credentials missing; grocery SMS will only be logged");
                Arc::new(LogOnlyNotifier)
            }
        };
        Ok(Self::new(mailer, sms))
    }

    pub async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        match delivery.channel {
            Channel::Email => self.mailer.send_email(&delivery.to, &delivery.message).await,
            Channel::Sms => self.sms.send_sms(&delivery.to, &delivery.message.text).await,
        }
    }
}
