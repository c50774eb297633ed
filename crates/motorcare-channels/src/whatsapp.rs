//! WhatsApp Business Cloud API gateway.
//!
//! Uses the official WhatsApp Business Platform (Cloud API) for messaging.
//! Requires: Access Token + Phone Number ID from Meta Business Suite.
//! Messages are template sends — the opt-in uses a parameterless template,
//! the reminder template takes the registration number and next service
//! date as body parameters.

use async_trait::async_trait;
use std::time::Duration;

use motorcare_core::config::WhatsAppConfig;
use motorcare_core::error::{MotorcareError, Result};
use motorcare_core::traits::{MessagingGateway, SendReceipt};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v21.0";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WhatsAppGateway {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

impl WhatsAppGateway {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn check_credentials(&self) -> Result<()> {
        if self.config.access_token.is_empty() {
            return Err(MotorcareError::Config(
                "WhatsApp access_token not configured".into(),
            ));
        }
        if self.config.phone_number_id.is_empty() {
            return Err(MotorcareError::Config(
                "WhatsApp phone_number_id not configured".into(),
            ));
        }
        Ok(())
    }

    /// Send a template message and extract the provider message id.
    async fn send_template(&self, to: &str, payload: serde_json::Value) -> Result<SendReceipt> {
        self.check_credentials()?;
        let url = format!(
            "{GRAPH_API_BASE}/{}/messages",
            self.config.phone_number_id
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.access_token))
            .header("Content-Type", "application/json")
            .json(&payload)
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .map_err(|e| MotorcareError::Gateway(format!("WhatsApp API request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MotorcareError::AuthFailed(format!(
                "WhatsApp token rejected: {error_text}"
            )));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MotorcareError::Gateway(format!(
                "WhatsApp API error {status}: {error_text}"
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MotorcareError::Gateway(format!("Invalid WhatsApp response: {e}")))?;

        let msg_id = result["messages"][0]["id"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        tracing::debug!("WhatsApp message sent: {} → {}", msg_id, to);
        Ok(SendReceipt {
            message_id: msg_id,
            to: to.to_string(),
        })
    }
}

/// Build a Cloud API template payload. Parameterless templates (like the
/// stock `hello_world`) omit the components array entirely.
pub fn template_payload(to: &str, template: &str, params: &[&str]) -> serde_json::Value {
    let mut tpl = serde_json::json!({
        "name": template,
        "language": { "code": "en" }
    });
    if !params.is_empty() {
        tpl["components"] = serde_json::json!([{
            "type": "body",
            "parameters": params.iter()
                .map(|p| serde_json::json!({"type": "text", "text": p}))
                .collect::<Vec<_>>()
        }]);
    }
    serde_json::json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "template",
        "template": tpl
    })
}

#[async_trait]
impl MessagingGateway for WhatsAppGateway {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn verify(&self) -> Result<()> {
        self.check_credentials()?;

        // Verify token by fetching the phone number resource
        let url = format!("{GRAPH_API_BASE}/{}", self.config.phone_number_id);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.access_token))
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .map_err(|e| MotorcareError::Gateway(format!("WhatsApp verification failed: {e}")))?;

        if response.status().is_success() {
            tracing::info!(
                "WhatsApp Business: verified (phone_id={})",
                self.config.phone_number_id
            );
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(MotorcareError::AuthFailed(format!(
                "WhatsApp token verification failed: {text}"
            )))
        }
    }

    async fn send_opt_in(&self, phone: &str, registration: &str) -> Result<SendReceipt> {
        tracing::debug!("Sending opt-in for {registration} to {phone}");
        let payload = template_payload(phone, &self.config.opt_in_template, &[]);
        self.send_template(phone, payload).await
    }

    async fn send_reminder(
        &self,
        phone: &str,
        registration: &str,
        next_service: &str,
    ) -> Result<SendReceipt> {
        tracing::debug!("Sending reminder for {registration} to {phone}");
        let payload = template_payload(
            phone,
            &self.config.reminder_template,
            &[registration, next_service],
        );
        self.send_template(phone, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameterless_template_payload() {
        let p = template_payload("+919876543210", "hello_world", &[]);
        assert_eq!(p["messaging_product"], "whatsapp");
        assert_eq!(p["to"], "+919876543210");
        assert_eq!(p["type"], "template");
        assert_eq!(p["template"]["name"], "hello_world");
        assert_eq!(p["template"]["language"]["code"], "en");
        assert!(p["template"].get("components").is_none());
    }

    #[test]
    fn test_reminder_template_payload_params() {
        let p = template_payload("+919876543210", "service_reminder", &["KA01AB1234", "04/04/2026"]);
        let params = p["template"]["components"][0]["parameters"].as_array().unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0]["type"], "text");
        assert_eq!(params[0]["text"], "KA01AB1234");
        assert_eq!(params[1]["text"], "04/04/2026");
        assert_eq!(p["template"]["components"][0]["type"], "body");
    }

    #[tokio::test]
    async fn test_missing_credentials_are_fatal() {
        let gw = WhatsAppGateway::new(WhatsAppConfig::default());
        let err = gw.send_opt_in("+919876543210", "KA01AB1234").await.unwrap_err();
        assert!(err.is_fatal());
        let err = gw.verify().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
