use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

/// Environment variable prefix, e.g. `INTERVIEW_QUEUE__ADMISSION__MAX_CONCURRENT_CALLS=4`
pub const ENV_PREFIX: &str = "INTERVIEW_QUEUE";

/// Interview queue configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewQueueConfig {
    /// Call slot capacity and call duration
    pub admission: AdmissionConfig,

    /// Call URL provisioning
    pub provisioning: ProvisioningConfig,

    /// Log output
    pub logging: LoggingSettings,
}

/// Admission control configuration.
///
/// Fixed for the lifetime of a controller; not negotiable per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Number of concurrent call slots
    pub max_concurrent_calls: usize,

    /// Call length before forced eviction (seconds)
    pub max_session_duration_secs: u64,
}

/// Call URL provisioning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Base URL interview rooms are created under
    pub base_url: String,
}

/// Logging configuration as it appears in config files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,

    /// Include file and line information
    pub file_info: bool,
}

impl AdmissionConfig {
    /// Call duration as a chrono duration, for timestamp arithmetic
    pub fn session_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_session_duration_secs as i64)
    }
}

impl InterviewQueueConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// The file format follows its extension (TOML, JSON, YAML...).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        if self.admission.max_concurrent_calls == 0 {
            return Err(QueueError::config(
                "max_concurrent_calls must be greater than 0",
            ));
        }

        if self.admission.max_session_duration_secs == 0 {
            return Err(QueueError::config(
                "max_session_duration_secs must be greater than 0",
            ));
        }

        // Keeps end-time arithmetic far away from chrono's range limits.
        if self.admission.max_session_duration_secs > 7 * 24 * 3600 {
            return Err(QueueError::config(
                "max_session_duration_secs cannot exceed one week",
            ));
        }

        if self.provisioning.base_url.trim_end_matches('/').is_empty() {
            return Err(QueueError::config("provisioning.base_url cannot be empty"));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(QueueError::config(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 3,
            max_session_duration_secs: 1200, // 20 minutes
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            base_url: "https://calls.localhost/rooms".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
        }
    }
}
