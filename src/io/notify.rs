use crate::types::{FieldError, FieldResult};
use serde::Serialize;

/// Channel for operational notifications
pub trait Notifier {
    fn publish(&self, topic: &str, subject: &str, message: &str) -> FieldResult<()>;
}

impl<T: Notifier + ?Sized> Notifier for Box<T> {
    fn publish(&self, topic: &str, subject: &str, message: &str) -> FieldResult<()> {
        (**self).publish(topic, subject, message)
    }
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, topic: &str, subject: &str, message: &str) -> FieldResult<()> {
        log::warn!("[{}] {}: {}", topic, subject, message);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    topic: &'a str,
    subject: &'a str,
    message: &'a str,
}

/// Posts notifications as JSON to a webhook
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: std::time::Duration, user_agent: &str) -> FieldResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FieldError::Notification(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn publish(&self, topic: &str, subject: &str, message: &str) -> FieldResult<()> {
        log::info!("Publishing notification '{}' to {}", subject, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage {
                topic,
                subject,
                message,
            })
            .send()
            .map_err(|e| FieldError::Notification(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FieldError::Notification(format!(
                "HTTP {} from {}",
                response.status().as_u16(),
                self.url
            )));
        }
        Ok(())
    }
}
