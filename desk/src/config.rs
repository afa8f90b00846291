//! Configuration loading and validation.
//!
//! The desk is configured by a single TOML document. Its path is read from
//! `TICKETDESK_CONFIG` after a `.env` file (if any) has been loaded; without it the bundled
//! example under `desk/config/` is used.
//!
//! The raw document ([`DeskConfig`]) is validated once into [`Settings`]: times are parsed,
//! the timezone resolved, categories indexed and template overrides checked against the closed
//! template catalog. Nothing is looked up by string key after that.
//!
//! # Example
//!
//! ```toml
//! staff_role_ids = ["1001"]
//! max_open_tickets = 2
//!
//! [working_hours]
//! enabled = true
//! timezone = "Europe/Berlin"
//! open = "09:00"
//! close = "17:00"
//!
//! [[categories]]
//! key = "support"
//! name = "Support"
//! location_id = "2001"
//! staff_role_ids = ["1001"]
//! ```

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use ticketdesk_core::catalog::CommandName;
use ticketdesk_core::category::{CategoryDefinition, CategoryError, CategoryRegistry, MAX_QUESTIONS, Question};
use ticketdesk_core::environment::LifecyclePolicy;
use ticketdesk_core::ids::RoleId;
use ticketdesk_core::template::{MessageTemplate, TemplateName};
use ticketdesk_runtime::ports::TranscriptFormat;

use crate::gates::WorkingHours;

/// Environment variable naming the configuration file.
pub const ENV_CONFIG_PATH: &str = "TICKETDESK_CONFIG";

/// The example configuration shipped with the crate.
pub const BUNDLED_CONFIG: &str = include_str!("../config/ticketdesk.toml");

/// Problems found while loading the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not valid TOML or does not match the schema.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A time of day is not `HH:MM`.
    #[error("Invalid time '{value}' for {field}, expected HH:MM")]
    InvalidTime {
        /// Offending key.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// The timezone is not an IANA zone name.
    #[error("Unknown timezone '{0}'")]
    InvalidTimezone(String),

    /// Opening and closing time are equal.
    #[error("Working hours open and close at the same time ({0})")]
    EmptyWorkingWindow(String),

    /// No workspace staff group is configured.
    #[error("staff_role_ids must name at least one group")]
    NoStaffRoles,

    /// A template override does not name a known template.
    #[error("Unknown template '{0}'")]
    UnknownTemplate(String),

    /// The feedback form has too many questions.
    #[error("The rating form has {0} questions, at most {MAX_QUESTIONS} are allowed")]
    TooManyRatingQuestions(usize),

    /// The quota would forbid every ticket.
    #[error("max_open_tickets must be at least 1")]
    ZeroQuota,

    /// The category table is invalid.
    #[error(transparent)]
    Category(#[from] CategoryError),
}

/// Cooldown windows, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CooldownConfig {
    /// Between two ticket creation attempts by the same user.
    pub creation_secs: u64,
    /// Between two invocations of the same command by the same user.
    pub command_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            creation_secs: 10,
            command_secs: 5,
        }
    }
}

/// Lifecycle switches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeatureConfig {
    /// Offer claiming.
    pub claim: bool,
    /// A claim makes the category's staff groups read-only.
    pub exclusive_claim: bool,
    /// Only staff may close.
    pub close_staff_only: bool,
    /// Only staff may reopen.
    pub reopen_staff_only: bool,
    /// Closing removes the owner's access entry.
    pub close_removes_owner: bool,
    /// Seconds between the delete notice and the purge.
    pub delete_delay_secs: u64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        let policy = LifecyclePolicy::default();
        Self {
            claim: policy.claim_enabled,
            exclusive_claim: policy.exclusive_claim,
            close_staff_only: policy.close_staff_only,
            reopen_staff_only: policy.reopen_staff_only,
            close_removes_owner: policy.close_removes_owner,
            delete_delay_secs: policy.delete_delay.as_secs(),
        }
    }
}

/// Direct messages to the ticket owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    /// DM on close.
    pub on_close: bool,
    /// DM on reopen.
    pub on_reopen: bool,
    /// DM the transcript on delete.
    pub on_delete: bool,
    /// Attach the star rating menu to the delete DM.
    pub rating_prompt: bool,
    /// Questions of the feedback form shown after a rating.
    pub rating_questions: Vec<Question>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_close: true,
            on_reopen: true,
            on_delete: true,
            rating_prompt: true,
            rating_questions: Vec::new(),
        }
    }
}

/// Daily window in which tickets may be created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkingHoursConfig {
    /// Whether the window exists at all.
    pub enabled: bool,
    /// IANA timezone the times are in.
    pub timezone: String,
    /// Opening time, `HH:MM`.
    pub open: String,
    /// Closing time, `HH:MM`. Earlier than `open` means the window spans midnight.
    pub close: String,
    /// Refuse creation outside the window (otherwise it is informational only).
    pub block_creation: bool,
    /// Show the window on the intake message.
    pub add_field: bool,
    /// Title of that field.
    pub field_title: String,
    /// Body of that field; `{openingTime}` and `{closingTime}` are filled in.
    pub field_value: String,
}

impl Default for WorkingHoursConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timezone: "UTC".into(),
            open: "09:00".into(),
            close: "17:00".into(),
            block_creation: true,
            add_field: true,
            field_title: "Working Hours".into(),
            field_value: "> {openingTime} to {closingTime}".into(),
        }
    }
}

/// Plain-text replies that are not templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Messages {
    /// A ticket action was used outside a ticket.
    pub not_in_a_ticket: String,
    /// The actor lacks the staff groups.
    pub not_allowed: String,
    /// Anything unexpected went wrong.
    pub generic_failure: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            not_in_a_ticket: "This action can only be used inside a ticket.".into(),
            not_allowed: "You are not allowed to use this!".into(),
            generic_failure: crate::error::GENERIC_FAILURE.into(),
        }
    }
}

/// The configuration document as written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeskConfig {
    /// First value of the ticket counter (and first sequence number).
    pub sequence_start: u64,
    /// Workspace-wide staff groups.
    pub staff_role_ids: Vec<RoleId>,
    /// Open tickets a single user may hold.
    pub max_open_tickets: usize,
    /// Commands that are silently ignored.
    pub disabled_commands: Vec<CommandName>,
    /// Transcript rendering.
    pub transcript_format: TranscriptFormat,
    /// Prometheus scrape address; no exporter when absent.
    pub metrics_addr: Option<SocketAddr>,
    /// Cooldown windows.
    pub cooldowns: CooldownConfig,
    /// Lifecycle switches.
    pub features: FeatureConfig,
    /// Owner notifications.
    pub notifications: NotificationConfig,
    /// Creation window.
    pub working_hours: WorkingHoursConfig,
    /// Plain-text replies.
    pub messages: Messages,
    /// Intake categories.
    pub categories: Vec<CategoryDefinition>,
    /// Template overrides keyed by template name.
    pub templates: BTreeMap<String, MessageTemplate>,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            sequence_start: 1,
            staff_role_ids: Vec::new(),
            max_open_tickets: LifecyclePolicy::default().max_open_tickets,
            disabled_commands: Vec::new(),
            transcript_format: TranscriptFormat::default(),
            metrics_addr: None,
            cooldowns: CooldownConfig::default(),
            features: FeatureConfig::default(),
            notifications: NotificationConfig::default(),
            working_hours: WorkingHoursConfig::default(),
            messages: Messages::default(),
            categories: Vec::new(),
            templates: BTreeMap::new(),
        }
    }
}

/// Validated, typed configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Lifecycle policy handed to the engine.
    pub policy: LifecyclePolicy,
    /// Category table.
    pub categories: Arc<CategoryRegistry>,
    /// Creation window, when enabled.
    pub working_hours: Option<WorkingHours>,
    /// Creation cooldown.
    pub creation_cooldown: Duration,
    /// Per-command cooldown.
    pub command_cooldown: Duration,
    /// Seed of the ticket counter.
    pub sequence_start: u64,
    /// Ignored commands.
    pub disabled_commands: Vec<CommandName>,
    /// Transcript rendering.
    pub transcript_format: TranscriptFormat,
    /// Prometheus scrape address.
    pub metrics_addr: Option<SocketAddr>,
    /// Plain-text replies.
    pub messages: Messages,
    /// Feedback form questions.
    pub rating_questions: Vec<Question>,
    /// Template overrides.
    pub templates: BTreeMap<TemplateName, MessageTemplate>,
}

impl Settings {
    /// Load `.env`, then the file named by [`ENV_CONFIG_PATH`], or the bundled example.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] raised while reading or validating.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) => Self::from_path(path),
            Err(_) => {
                tracing::info!("{ENV_CONFIG_PATH} not set, using the bundled configuration");
                Self::from_toml_str(BUNDLED_CONFIG)
            }
        }
    }

    /// Read and validate a file.
    ///
    /// # Errors
    ///
    /// `Read` if the file cannot be read, otherwise see [`Settings::from_toml_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "Loading configuration");
        Self::from_toml_str(&raw)
    }

    /// Parse and validate a document.
    ///
    /// # Errors
    ///
    /// `Parse` for malformed TOML, otherwise see [`DeskConfig::validate`].
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str::<DeskConfig>(raw)?.validate()
    }

    /// Whether `command` is switched off.
    #[must_use]
    pub fn is_disabled(&self, command: CommandName) -> bool {
        self.disabled_commands.contains(&command)
    }
}

impl DeskConfig {
    /// Check every constraint and build [`Settings`].
    ///
    /// # Errors
    ///
    /// The first violated constraint.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        if self.staff_role_ids.is_empty() {
            return Err(ConfigError::NoStaffRoles);
        }
        if self.max_open_tickets == 0 {
            return Err(ConfigError::ZeroQuota);
        }
        let rating_questions = self.notifications.rating_questions.len();
        if rating_questions > MAX_QUESTIONS {
            return Err(ConfigError::TooManyRatingQuestions(rating_questions));
        }

        let categories = Arc::new(CategoryRegistry::new(self.categories)?);
        let working_hours = if self.working_hours.enabled {
            Some(working_hours(&self.working_hours)?)
        } else {
            None
        };
        let templates = self
            .templates
            .into_iter()
            .map(|(key, template)| {
                TemplateName::parse(&key)
                    .map(|name| (name, template))
                    .ok_or(ConfigError::UnknownTemplate(key))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let policy = LifecyclePolicy {
            staff_role_ids: self.staff_role_ids,
            max_open_tickets: self.max_open_tickets,
            claim_enabled: self.features.claim,
            exclusive_claim: self.features.exclusive_claim,
            close_staff_only: self.features.close_staff_only,
            reopen_staff_only: self.features.reopen_staff_only,
            close_removes_owner: self.features.close_removes_owner,
            notify_on_close: self.notifications.on_close,
            notify_on_reopen: self.notifications.on_reopen,
            notify_on_delete: self.notifications.on_delete,
            rating_prompt: self.notifications.rating_prompt,
            delete_delay: Duration::from_secs(self.features.delete_delay_secs),
        };

        Ok(Settings {
            policy,
            categories,
            working_hours,
            creation_cooldown: Duration::from_secs(self.cooldowns.creation_secs),
            command_cooldown: Duration::from_secs(self.cooldowns.command_secs),
            sequence_start: self.sequence_start,
            disabled_commands: self.disabled_commands,
            transcript_format: self.transcript_format,
            metrics_addr: self.metrics_addr,
            messages: self.messages,
            rating_questions: self.notifications.rating_questions,
            templates,
        })
    }
}

fn working_hours(config: &WorkingHoursConfig) -> Result<WorkingHours, ConfigError> {
    let timezone: Tz = config
        .timezone
        .parse()
        .map_err(|_| ConfigError::InvalidTimezone(config.timezone.clone()))?;
    let open = parse_time("working_hours.open", &config.open)?;
    let close = parse_time("working_hours.close", &config.close)?;
    if open == close {
        return Err(ConfigError::EmptyWorkingWindow(config.open.clone()));
    }
    Ok(WorkingHours {
        timezone,
        open,
        close,
        block_creation: config.block_creation,
        add_field: config.add_field,
        field_title: config.field_title.clone(),
        field_value: config.field_value.clone(),
    })
}

/// Strict `HH:MM`, 24-hour.
fn parse_time(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    let invalid = || ConfigError::InvalidTime {
        field,
        value: value.to_owned(),
    };
    if value.len() != 5 {
        return Err(invalid());
    }
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| invalid())
}
