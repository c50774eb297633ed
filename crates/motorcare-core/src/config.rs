//! Motorcare configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MotorcareConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub reminder: ReminderConfig,
}

impl MotorcareConfig {
    /// Load config from the default path (~/.motorcare/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::MotorcareError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::MotorcareError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::MotorcareError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Motorcare home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".motorcare")
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.motorcare/records.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Messaging provider selection + per-provider credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Which gateway to use: "whatsapp" (Cloud API) or "twilio".
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
}

fn default_provider() -> String {
    "whatsapp".into()
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            whatsapp: WhatsAppConfig::default(),
            twilio: TwilioConfig::default(),
        }
    }
}

/// WhatsApp Business Cloud API configuration.
/// Requires: Access Token + Phone Number ID from Meta Business Suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Facebook Graph API access token
    #[serde(default)]
    pub access_token: String,
    /// WhatsApp Phone Number ID
    #[serde(default)]
    pub phone_number_id: String,
    /// Template used for the opt-in confirmation
    #[serde(default = "default_opt_in_template")]
    pub opt_in_template: String,
    /// Template used for the service reminder
    #[serde(default = "default_reminder_template")]
    pub reminder_template: String,
}

fn default_opt_in_template() -> String {
    "hello_world".into()
}

fn default_reminder_template() -> String {
    "service_reminder".into()
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            opt_in_template: default_opt_in_template(),
            reminder_template: default_reminder_template(),
        }
    }
}

/// Twilio WhatsApp API configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    /// Sender number, e.g. "+14155238886".
    #[serde(default)]
    pub from_number: String,
}

/// Reminder scheduling windows and cadence. All durations in seconds.
///
/// Reference defaults are deliberately short (one-minute cadence) to match
/// the template-approval test flow; production deployments override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// How long after creation an opt-in may still be sent.
    #[serde(default = "default_minute")]
    pub opt_in_window_secs: u64,
    /// How long after a successful opt-in the reminder becomes due.
    #[serde(default = "default_minute")]
    pub reminder_delay_secs: u64,
    /// How long the reminder stays due once the delay has elapsed.
    #[serde(default = "default_minute")]
    pub reminder_window_secs: u64,
    /// How often the scheduler wakes up and scans.
    #[serde(default = "default_minute")]
    pub check_interval_secs: u64,
    /// Offset from last service to next service, fixed at record creation.
    #[serde(default = "default_minute")]
    pub service_interval_secs: u64,
}

fn default_minute() -> u64 {
    60
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            opt_in_window_secs: default_minute(),
            reminder_delay_secs: default_minute(),
            reminder_window_secs: default_minute(),
            check_interval_secs: default_minute(),
            service_interval_secs: default_minute(),
        }
    }
}

impl ReminderConfig {
    pub fn opt_in_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.opt_in_window_secs as i64)
    }

    pub fn reminder_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reminder_delay_secs as i64)
    }

    pub fn reminder_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reminder_window_secs as i64)
    }

    pub fn service_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.service_interval_secs as i64)
    }
}
