use anyhow::{bail, Context};
use chrono::NaiveTime;
use chrono_tz::Tz;
use config::Config;
use serde::Deserialize;
use std::{env, path::Path};

/// Which mailbox transport the fetch stage uses. Chosen once at startup,
/// invisible to the rest of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxProvider {
    Gmail,
    Imap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailboxConfig {
    pub provider: MailboxProvider,
    pub gmail_access_token: Option<String>,
    pub imap_host: Option<String>,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    pub imap_user: Option<String>,
    pub imap_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_api_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Comma-separated list of digest recipients.
    pub recipients: String,
    /// Whether a zero-message run still sends a "no important emails"
    /// digest. Explicit policy flag, not inferred.
    #[serde(default = "default_true")]
    pub send_empty_digest: bool,
}

impl DeliveryConfig {
    pub fn recipient_list(&self) -> Vec<String> {
        self.recipients
            .split(',')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_morning_time")]
    pub morning_time: String,
    #[serde(default = "default_evening_time")]
    pub evening_time: String,
    #[serde(default = "default_cutoff_hours")]
    pub morning_cutoff_hours: u32,
    #[serde(default = "default_cutoff_hours")]
    pub evening_cutoff_hours: u32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl ScheduleConfig {
    pub fn timezone(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .ok()
            .context(format!("unknown timezone: {}", self.timezone))
    }

    pub fn morning_fire_at(&self) -> anyhow::Result<NaiveTime> {
        parse_fire_time(&self.morning_time)
    }

    pub fn evening_fire_at(&self) -> anyhow::Result<NaiveTime> {
        parse_fire_time(&self.evening_time)
    }
}

fn parse_fire_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").context(format!("invalid schedule time: {s}"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_emails")]
    pub max_emails_per_digest: usize,
    #[serde(default = "default_concurrency")]
    pub summary_concurrency: usize,
    #[serde(default = "default_summary_attempts")]
    pub summary_attempts: u32,
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_prompt_rate")]
    pub prompts_per_sec: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DigestConfig {
    pub mailbox: MailboxConfig,
    pub api: ApiConfig,
    pub smtp: SmtpConfig,
    pub delivery: DeliveryConfig,
    #[serde(default = "default_schedule")]
    pub schedule: ScheduleConfig,
    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,
}

impl DigestConfig {
    /// Load from an optional TOML file plus `DIGEST_`-prefixed environment
    /// variables (nested keys separated by `__`, e.g. `DIGEST_SMTP__HOST`).
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = Config::builder();

        let file = env::var("DIGEST_CONFIG_FILE").unwrap_or_else(|_| "maildigest.toml".to_string());
        if Path::new(&file).exists() {
            builder = builder.add_source(config::File::with_name(&file));
        }

        let cfg: DigestConfig = builder
            .add_source(
                config::Environment::with_prefix("DIGEST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("could not assemble configuration")?
            .try_deserialize()
            .context("configuration is invalid")?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        match self.mailbox.provider {
            MailboxProvider::Gmail => {
                if self.mailbox.gmail_access_token.is_none() {
                    bail!("mailbox.gmail_access_token is required for the gmail provider");
                }
            }
            MailboxProvider::Imap => {
                if self.mailbox.imap_host.is_none()
                    || self.mailbox.imap_user.is_none()
                    || self.mailbox.imap_password.is_none()
                {
                    bail!("mailbox.imap_host/imap_user/imap_password are required for the imap provider");
                }
            }
        }
        if self.delivery.recipient_list().is_empty() {
            bail!("delivery.recipients must contain at least one address");
        }
        if self.limits.summary_concurrency == 0 {
            bail!("limits.summary_concurrency must be at least 1");
        }
        self.schedule.timezone()?;
        self.schedule.morning_fire_at()?;
        self.schedule.evening_fire_at()?;
        Ok(())
    }
}

fn default_imap_port() -> u16 {
    993
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_api_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_true() -> bool {
    true
}
fn default_morning_time() -> String {
    "07:00".to_string()
}
fn default_evening_time() -> String {
    "21:00".to_string()
}
fn default_cutoff_hours() -> u32 {
    12
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_max_emails() -> usize {
    50
}
fn default_concurrency() -> usize {
    5
}
fn default_summary_attempts() -> u32 {
    2
}
fn default_fetch_attempts() -> u32 {
    3
}
fn default_request_timeout() -> u64 {
    30
}
fn default_run_timeout() -> u64 {
    600
}
fn default_prompt_rate() -> usize {
    2
}
fn default_schedule() -> ScheduleConfig {
    ScheduleConfig {
        morning_time: default_morning_time(),
        evening_time: default_evening_time(),
        morning_cutoff_hours: default_cutoff_hours(),
        evening_cutoff_hours: default_cutoff_hours(),
        timezone: default_timezone(),
    }
}
fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_emails_per_digest: default_max_emails(),
        summary_concurrency: default_concurrency(),
        summary_attempts: default_summary_attempts(),
        fetch_attempts: default_fetch_attempts(),
        request_timeout_secs: default_request_timeout(),
        run_timeout_secs: default_run_timeout(),
        prompts_per_sec: default_prompt_rate(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> DigestConfig {
        DigestConfig {
            mailbox: MailboxConfig {
                provider: MailboxProvider::Imap,
                gmail_access_token: None,
                imap_host: Some("imap.example.com".to_string()),
                imap_port: 993,
                imap_user: Some("me@example.com".to_string()),
                imap_password: Some("app-password".to_string()),
            },
            api: ApiConfig {
                key: "sk-test".to_string(),
                model: default_model(),
                temperature: default_temperature(),
                endpoint: default_api_endpoint(),
            },
            smtp: SmtpConfig {
                host: "smtp.example.com".to_string(),
                username: "me@example.com".to_string(),
                password: "app-password".to_string(),
                from_address: "Digest <digest@example.com>".to_string(),
            },
            delivery: DeliveryConfig {
                recipients: "a@example.com, b@example.com".to_string(),
                send_empty_digest: true,
            },
            schedule: default_schedule(),
            limits: default_limits(),
        }
    }

    #[test]
    fn test_recipient_list_splits_and_trims() {
        let cfg = base_config();
        assert_eq!(
            cfg.delivery.recipient_list(),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
    }

    #[test]
    fn test_empty_recipients_rejected() {
        let mut cfg = base_config();
        cfg.delivery.recipients = " , ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_gmail_provider_requires_token() {
        let mut cfg = base_config();
        cfg.mailbox.provider = MailboxProvider::Gmail;
        assert!(cfg.validate().is_err());
        cfg.mailbox.gmail_access_token = Some("ya29.token".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_schedule_times_parse() {
        let cfg = base_config();
        assert_eq!(
            cfg.schedule.morning_fire_at().unwrap(),
            NaiveTime::from_hms_opt(7, 0, 0).unwrap()
        );
        assert_eq!(
            cfg.schedule.evening_fire_at().unwrap(),
            NaiveTime::from_hms_opt(21, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_bad_schedule_time_rejected() {
        let mut cfg = base_config();
        cfg.schedule.morning_time = "7am".to_string();
        assert!(cfg.validate().is_err());
    }
}
