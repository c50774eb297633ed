//! # Motorcare Channels
//!
//! `MessagingGateway` implementations. Two interchangeable providers:
//! the WhatsApp Business Cloud API (default) and Twilio's WhatsApp API.
//! The active one is picked by the `messaging.provider` config key.

pub mod twilio;
pub mod whatsapp;

pub use twilio::TwilioGateway;
pub use whatsapp::WhatsAppGateway;

use std::sync::Arc;

use motorcare_core::config::MessagingConfig;
use motorcare_core::error::{MotorcareError, Result};
use motorcare_core::traits::MessagingGateway;

/// Build the configured gateway.
pub fn gateway_from_config(config: &MessagingConfig) -> Result<Arc<dyn MessagingGateway>> {
    match config.provider.as_str() {
        "whatsapp" => Ok(Arc::new(WhatsAppGateway::new(config.whatsapp.clone()))),
        "twilio" => Ok(Arc::new(TwilioGateway::new(config.twilio.clone()))),
        other => Err(MotorcareError::Config(format!(
            "Unknown messaging provider '{other}' (expected 'whatsapp' or 'twilio')"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_selection() {
        let mut cfg = MessagingConfig::default();
        assert_eq!(gateway_from_config(&cfg).unwrap().name(), "whatsapp");
        cfg.provider = "twilio".into();
        assert_eq!(gateway_from_config(&cfg).unwrap().name(), "twilio");
        cfg.provider = "sms".into();
        assert!(gateway_from_config(&cfg).is_err());
    }
}
