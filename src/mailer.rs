use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail gateway rejected message: {0}")]
    Gateway(String),

    #[error("mail transport error")]
    Transport(#[from] reqwest::Error),
}

/// Outbound mail transport.
///
/// `Http` posts to a JSON mail gateway, `Log` writes the message to the log
/// (the default when no gateway is configured), `Memory` records messages for
/// tests and can simulate transient failures.
#[derive(Clone)]
pub enum Mailer {
    Http(HttpMailer),
    Log,
    Memory(MemoryMailer),
}

impl Mailer {
    pub async fn send(&self, from: &str, email: &EmailMessage) -> Result<(), MailError> {
        match self {
            Mailer::Http(mailer) => mailer.send(from, email).await,
            Mailer::Log => {
                tracing::info!(to = %email.to, subject = %email.subject, "email (log transport)");
                Ok(())
            }
            Mailer::Memory(mailer) => mailer.send(email),
        }
    }
}

#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct GatewayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn send(&self, from: &str, email: &EmailMessage) -> Result<(), MailError> {
        let payload = GatewayPayload {
            from,
            to: &email.to,
            subject: &email.subject,
            text: &email.body,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MailError::Gateway(format!("status {}", response.status())));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    fail_remaining: Arc<AtomicU32>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that fails the first `times` sends, then succeeds.
    pub fn failing(times: u32) -> Self {
        let mailer = Self::default();
        mailer.fail_remaining.store(times, Ordering::SeqCst);
        mailer
    }

    fn send(&self, email: &EmailMessage) -> Result<(), MailError> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(MailError::Gateway("simulated failure".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(email.clone());
        Ok(())
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_mailer_records_messages() {
        let memory = MemoryMailer::new();
        let mailer = Mailer::Memory(memory.clone());
        let email = EmailMessage {
            to: "user@example.com".into(),
            subject: "hello".into(),
            body: "body".into(),
        };
        mailer.send("shop@example.com", &email).await.unwrap();
        let sent = memory.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "hello");
    }

    #[tokio::test]
    async fn failing_mailer_recovers_after_configured_failures() {
        let memory = MemoryMailer::failing(2);
        let mailer = Mailer::Memory(memory.clone());
        let email = EmailMessage {
            to: "user@example.com".into(),
            subject: "s".into(),
            body: "b".into(),
        };
        assert!(mailer.send("from@example.com", &email).await.is_err());
        assert!(mailer.send("from@example.com", &email).await.is_err());
        assert!(mailer.send("from@example.com", &email).await.is_ok());
        assert_eq!(memory.sent().len(), 1);
    }
}
