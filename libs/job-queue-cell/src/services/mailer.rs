use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use shared_config::AppConfig;

use crate::Email;

/// Outbound mail. Delivery problems are reported as `false`, never as an
/// error, so a bad address cannot fail the job that sends it.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> bool;
}

/// Posts messages as JSON to a transactional mail API.
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    sender: String,
}

impl HttpMailer {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.mail_api_url.clone(),
            api_key: config.mail_api_key.clone(),
            sender: config.mail_default_sender.clone(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> bool {
        let body = json!({
            "from": self.sender,
            "to": email.to,
            "subject": email.subject,
            "html": email.html_body,
            "text": email.text_body,
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(res) if res.status().is_success() => {
                debug!("Email '{}' delivered to {}", email.subject, email.to);
                true
            }
            Ok(res) => {
                warn!("Mail API rejected email to {}: {}", email.to, res.status());
                false
            }
            Err(e) => {
                warn!("Failed to send email to {}: {}", email.to, e);
                false
            }
        }
    }
}

/// Development mailer that only logs.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> bool {
        info!("Email to {}: {}", email.to, email.subject);
        debug!("{}", email.text_body);
        true
    }
}
