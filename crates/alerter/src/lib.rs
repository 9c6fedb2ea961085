use reqwest::Client;
use tender_core::types::Tender;
use tracing::{error, info};

/// §4.H: a Telegram bot is the one alert channel. Missing credentials are
/// not an error — `notify` becomes a no-op so the pipeline never blocks on
/// alerting being configured.
#[derive(Clone)]
pub struct AlerterConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

pub struct Alerter {
    client: Client,
    config: AlerterConfig,
}

impl Alerter {
    pub fn new(config: AlerterConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Sends a Markdown-formatted alert naming the tender and the message.
    /// Delivery failures are logged, not propagated — alerting is best
    /// effort and must never fail the caller's pipeline step.
    pub async fn notify(&self, tender: &Tender, message: &str) {
        let (Some(token), Some(chat_id)) = (&self.config.bot_token, &self.config.chat_id) else {
            error!("Telegram credentials not configured");
            return;
        };

        let full_message = format!(
            "Тендер: {}\nНазвание: {}\nСостояние: {}\nСообщение: {}\nKontur Link: {}",
            tender.external_id,
            tender.title,
            tender.state,
            message,
            tender.kontur_link.as_deref().unwrap_or(""),
        );

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": full_message,
            "parse_mode": "Markdown",
        });

        match self.client.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Telegram alert sent for tender {}: {}", tender.external_id, message);
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!("Failed to send Telegram alert: HTTP {} {}", status, body);
            }
            Err(e) => {
                error!(
                    "Error sending Telegram alert for tender {}: {}",
                    tender.external_id, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tender_core::types::Organizer;

    fn tender() -> Tender {
        Tender {
            external_id: "IS1".to_string(),
            title: "Supply of office chairs".to_string(),
            notification_number: None,
            notification_type: None,
            organizer: Organizer::default(),
            initial_price: None,
            currency: None,
            application_deadline: None,
            etp_code: None,
            etp_name: None,
            etp_url: None,
            kontur_link: None,
            publication_date: None,
            last_modified: None,
            selection_method: None,
            smp: None,
            r#type: "goods".to_string(),
            state: "ERROR".to_string(),
            created_at: Utc::now(),
            lots: vec![],
            docs: vec![],
        }
    }

    #[tokio::test]
    async fn notify_is_a_noop_without_credentials() {
        let alerter = Alerter::new(AlerterConfig {
            bot_token: None,
            chat_id: None,
        });
        // Must not panic or attempt a network call.
        alerter.notify(&tender(), "test message").await;
    }
}
