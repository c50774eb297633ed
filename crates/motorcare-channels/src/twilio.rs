//! Twilio WhatsApp gateway — the second interchangeable provider.
//!
//! Uses the Twilio Messages API with `whatsapp:`-prefixed addresses and
//! plain-text bodies instead of Meta templates, which is handy for sandbox
//! numbers where no approved templates exist.

use async_trait::async_trait;
use std::time::Duration;

use motorcare_core::config::TwilioConfig;
use motorcare_core::error::{MotorcareError, Result};
use motorcare_core::traits::{MessagingGateway, SendReceipt};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TwilioGateway {
    config: TwilioConfig,
    client: reqwest::Client,
}

impl TwilioGateway {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn check_credentials(&self) -> Result<()> {
        if self.config.account_sid.is_empty() || self.config.auth_token.is_empty() {
            return Err(MotorcareError::Config(
                "Twilio account_sid/auth_token not configured".into(),
            ));
        }
        if self.config.from_number.is_empty() {
            return Err(MotorcareError::Config(
                "Twilio from_number not configured".into(),
            ));
        }
        Ok(())
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt> {
        self.check_credentials()?;
        let url = format!(
            "{TWILIO_API_BASE}/Accounts/{}/Messages.json",
            self.config.account_sid
        );

        let form = [
            ("To", whatsapp_address(to)),
            ("From", whatsapp_address(&self.config.from_number)),
            ("Body", body.to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .map_err(|e| MotorcareError::Gateway(format!("Twilio request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MotorcareError::AuthFailed(
                "Twilio credentials rejected".into(),
            ));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MotorcareError::Gateway(format!(
                "Twilio API error {status}: {error_text}"
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MotorcareError::Gateway(format!("Invalid Twilio response: {e}")))?;

        let sid = result["sid"].as_str().unwrap_or("unknown").to_string();
        tracing::debug!("Twilio message sent: {} → {}", sid, to);
        Ok(SendReceipt {
            message_id: sid,
            to: to.to_string(),
        })
    }
}

/// Prefix a number for Twilio's WhatsApp transport, once.
fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

/// Opt-in confirmation body.
fn opt_in_body(registration: &str) -> String {
    format!(
        "Your vehicle {registration} has been registered for service reminders. \
         Reply STOP to opt out."
    )
}

/// Service reminder body.
fn reminder_body(registration: &str, next_service: &str) -> String {
    format!(
        "Service reminder: your vehicle {registration} is due for service on {next_service}. \
         Book your slot today."
    )
}

#[async_trait]
impl MessagingGateway for TwilioGateway {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn verify(&self) -> Result<()> {
        self.check_credentials()?;

        let url = format!(
            "{TWILIO_API_BASE}/Accounts/{}.json",
            self.config.account_sid
        );
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .map_err(|e| MotorcareError::Gateway(format!("Twilio verification failed: {e}")))?;

        if response.status().is_success() {
            tracing::info!("Twilio: verified (account={})", self.config.account_sid);
            Ok(())
        } else {
            Err(MotorcareError::AuthFailed(format!(
                "Twilio credential check failed: {}",
                response.status()
            )))
        }
    }

    async fn send_opt_in(&self, phone: &str, registration: &str) -> Result<SendReceipt> {
        self.send_text(phone, &opt_in_body(registration)).await
    }

    async fn send_reminder(
        &self,
        phone: &str,
        registration: &str,
        next_service: &str,
    ) -> Result<SendReceipt> {
        self.send_text(phone, &reminder_body(registration, next_service))
            .await
    }
}
