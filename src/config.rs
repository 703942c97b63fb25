//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Subject filter for inbound campaign task emails.
pub const DEFAULT_INBOUND_SUBJECT: &str = "New Campaign Task";

/// Subject of the outreach email.
pub const DEFAULT_OUTREACH_SUBJECT: &str = "Special Offer for Your Business";

/// Body of the outreach email.
pub const DEFAULT_OUTREACH_BODY: &str = "Your custom sales message here...";

/// Daily report at 16:00 local time (sec min hour dom month dow).
pub const DEFAULT_REPORT_SCHEDULE: &str = "0 0 16 * * *";

/// Pipeline tuning: poll intervals, retry cap, and business-rule lists.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Idle sleep of the verification worker when its channel is empty.
    pub verification_poll_interval: Duration,
    /// Idle sleep of the outreach worker when its channel is empty.
    pub outreach_poll_interval: Duration,
    /// Minimum gap between two delivery attempts for the same lead.
    pub retry_delay: Duration,
    /// Supervisor discovery/inbound cycle.
    pub supervisor_interval: Duration,
    /// Total delivery attempts per lead, including the first one.
    pub max_delivery_attempts: u32,
    /// Subject filter for inbound task emails.
    pub inbound_subject_filter: String,
    /// Industries rejected during verification (case-insensitive).
    pub excluded_industries: Vec<String>,
    /// Company names rejected during verification (case-insensitive).
    pub excluded_companies: Vec<String>,
    pub outreach_subject: String,
    pub outreach_body: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verification_poll_interval: Duration::from_secs(1),
            outreach_poll_interval: Duration::from_secs(1),
            retry_delay: Duration::from_secs(1),
            supervisor_interval: Duration::from_secs(300), // 5 minutes
            max_delivery_attempts: 3,
            inbound_subject_filter: DEFAULT_INBOUND_SUBJECT.to_string(),
            excluded_industries: vec!["competitor".into(), "direct competitor".into()],
            excluded_companies: vec!["test company".into()],
            outreach_subject: DEFAULT_OUTREACH_SUBJECT.to_string(),
            outreach_body: DEFAULT_OUTREACH_BODY.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Overlay environment variables on the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_delivery_attempts =
            parse_env("LEAD_MAX_DELIVERY_ATTEMPTS")?.unwrap_or(defaults.max_delivery_attempts);
        if max_delivery_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LEAD_MAX_DELIVERY_ATTEMPTS".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            verification_poll_interval: parse_env("LEAD_VERIFY_POLL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.verification_poll_interval),
            outreach_poll_interval: parse_env("LEAD_OUTREACH_POLL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.outreach_poll_interval),
            retry_delay: parse_env("LEAD_RETRY_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            supervisor_interval: non_zero(
                "LEAD_SUPERVISOR_INTERVAL_SECS",
                parse_env("LEAD_SUPERVISOR_INTERVAL_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.supervisor_interval),
            )?,
            max_delivery_attempts,
            inbound_subject_filter: std::env::var("LEAD_INBOUND_SUBJECT")
                .unwrap_or(defaults.inbound_subject_filter),
            excluded_industries: list_env("LEAD_EXCLUDED_INDUSTRIES")
                .unwrap_or(defaults.excluded_industries),
            excluded_companies: list_env("LEAD_EXCLUDED_COMPANIES")
                .unwrap_or(defaults.excluded_companies),
            outreach_subject: std::env::var("LEAD_OUTREACH_SUBJECT")
                .unwrap_or(defaults.outreach_subject),
            outreach_body: std::env::var("LEAD_OUTREACH_BODY").unwrap_or(defaults.outreach_body),
        })
    }
}

/// Outbound SMTP settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// `USER_EMAIL` and `APP_PASSWORD` are required; the relay defaults to Gmail.
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = require_env("USER_EMAIL")?;
        let password = SecretString::from(require_env("APP_PASSWORD")?);

        Ok(Self {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            port: parse_env("SMTP_PORT")?.unwrap_or(587),
            from_address: std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone()),
            username,
            password,
        })
    }
}

/// Inbound IMAP mailbox settings.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
}

impl MailboxConfig {
    /// Returns `None` if `IMAP_HOST` is not set (inbound polling disabled).
    /// Credentials fall back to the SMTP account.
    pub fn from_env(smtp: &SmtpConfig) -> Result<Option<Self>, ConfigError> {
        let Ok(imap_host) = std::env::var("IMAP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            imap_host,
            imap_port: parse_env("IMAP_PORT")?.unwrap_or(993),
            username: std::env::var("IMAP_USERNAME").unwrap_or_else(|_| smtp.username.clone()),
            password: std::env::var("IMAP_PASSWORD")
                .map(SecretString::from)
                .unwrap_or_else(|_| smtp.password.clone()),
        }))
    }
}

/// Daily campaign report settings.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub recipient: String,
    pub schedule: cron::Schedule,
    /// How often the scheduler checks whether the report is due.
    pub tick_interval: Duration,
}

impl ReportConfig {
    /// Returns `None` if `REPORT_RECIPIENT` is not set (reports disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(recipient) = std::env::var("REPORT_RECIPIENT") else {
            return Ok(None);
        };
        let expr =
            std::env::var("LEAD_REPORT_CRON").unwrap_or_else(|_| DEFAULT_REPORT_SCHEDULE.into());

        Ok(Some(Self {
            recipient,
            schedule: parse_schedule(&expr)?,
            tick_interval: non_zero(
                "LEAD_REPORT_TICK_SECS",
                parse_env("LEAD_REPORT_TICK_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(Duration::from_secs(60)),
            )?,
        }))
    }
}

/// Everything the binary needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub smtp: SmtpConfig,
    pub mailbox: Option<MailboxConfig>,
    pub report: Option<ReportConfig>,
    /// libSQL database holding the lead records.
    pub store_path: PathBuf,
    /// Directory for the rolling log file. Stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let smtp = SmtpConfig::from_env()?;
        let mailbox = MailboxConfig::from_env(&smtp)?;

        Ok(Self {
            pipeline: PipelineConfig::from_env()?,
            mailbox,
            smtp,
            report: ReportConfig::from_env()?,
            store_path: std::env::var("LEAD_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/leads.db")),
            log_dir: std::env::var("LEAD_LOG_DIR").ok().map(PathBuf::from),
        })
    }
}

/// Parse a cron expression into a schedule.
pub fn parse_schedule(expr: &str) -> Result<cron::Schedule, ConfigError> {
    cron::Schedule::from_str(expr).map_err(|e| ConfigError::InvalidValue {
        key: "LEAD_REPORT_CRON".into(),
        message: format!("invalid cron '{expr}': {e}"),
    })
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Read and parse an optional variable. Unset is `Ok(None)`, garbage is an error.
fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Timer periods must be positive.
fn non_zero(key: &str, period: Duration) -> Result<Duration, ConfigError> {
    if period.is_zero() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".into(),
        });
    }
    Ok(period)
}

/// Comma-separated list, lowercased and trimmed.
fn list_env(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|raw| split_list(&raw))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
