//! Session and resolver configuration
//!
//! [`SessionConfig`] is injected into every session at construction and can be
//! loaded from TOML. The process-wide "ignore all empty actions" switch is
//! kept only for callers that rely on the legacy global behavior; a session
//! consults it only when `legacy_global_ignore_empty` is set.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use actionflow_core::{ExecutionType, DEFAULT_COMMAND_TIMEOUT};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// =============================================================================
// Process-wide legacy switch
// =============================================================================

static IGNORE_ALL_EMPTY_ACTIONS: AtomicBool = AtomicBool::new(false);

/// Set the process-wide "ignore all empty actions" switch.
///
/// Best effort: concurrent readers may observe the old value.
pub fn set_ignore_all_empty_actions(value: bool) {
    IGNORE_ALL_EMPTY_ACTIONS.store(value, Ordering::Relaxed);
}

/// Current value of the process-wide "ignore all empty actions" switch
pub fn ignore_all_empty_actions() -> bool {
    IGNORE_ALL_EMPTY_ACTIONS.load(Ordering::Relaxed)
}

// =============================================================================
// SessionConfig
// =============================================================================

/// Per-session execution policy.
///
/// # Example
///
/// ```toml
/// # Treat a session with no actions as a clean, empty success
/// ignore_empty_actions = false
///
/// # Return captured failures as Err instead of only reporting them
/// throw_on_error = false
///
/// # "default", "continue_on_error" or "execute_and_rollback"
/// execution_type = "default"
///
/// # Command timeout hint for new actions, in seconds
/// default_command_timeout = 30
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Treat an empty session as an empty success
    #[serde(default)]
    pub ignore_empty_actions: bool,
    /// Return captured failures as `Err` after notifying observers
    #[serde(default)]
    pub throw_on_error: bool,
    /// Failure-handling hint forwarded to the executor
    #[serde(default)]
    pub execution_type: ExecutionType,
    /// Timeout hint for actions registered without one, in seconds
    #[serde(default = "default_command_timeout")]
    pub default_command_timeout: u32,
    /// Also honor the process-wide "ignore all empty actions" switch
    #[serde(default)]
    pub legacy_global_ignore_empty: bool,
}

fn default_command_timeout() -> u32 {
    DEFAULT_COMMAND_TIMEOUT
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ignore_empty_actions: false,
            throw_on_error: false,
            execution_type: ExecutionType::Default,
            default_command_timeout: DEFAULT_COMMAND_TIMEOUT,
            legacy_global_ignore_empty: false,
        }
    }
}

impl SessionConfig {
    /// Whether an empty session short-circuits to an empty success
    pub fn ignores_empty_actions(&self) -> bool {
        self.ignore_empty_actions || (self.legacy_global_ignore_empty && ignore_all_empty_actions())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Persistence session configuration
#
# Treat a session with no actions as a clean, empty success (default: false).
# When false, executing an empty session fails with "no actions to execute".
ignore_empty_actions = false

# Return captured failures as errors after observers are notified (default: false)
throw_on_error = false

# Failure-handling hint forwarded to the executor:
#   "default"              = stop at the first failure and roll back
#   "continue_on_error"    = keep going after a failure
#   "execute_and_rollback" = run everything, then roll back
execution_type = "default"

# Command timeout hint for new actions, in seconds (default: 30)
default_command_timeout = 30

# Also honor the process-wide "ignore all empty actions" switch (default: false)
legacy_global_ignore_empty = false
"#
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the text is not valid config TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SessionConfig = toml::from_str(content).map_err(|e| Error::Configuration {
            reason: format!("Failed to parse session config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Configuration {
            reason: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Configuration {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        std::fs::write(path, content).map_err(|e| Error::Configuration {
            reason: format!("Failed to write config file '{}': {}", path.display(), e),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.default_command_timeout == 0 {
            return Err(Error::Configuration {
                reason: "default_command_timeout must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// ResolverConfig
// =============================================================================

/// Executor resolver settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Provider used when the first action of a batch names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
}

impl ResolverConfig {
    /// Config with a fallback provider
    pub fn with_default_provider(provider: impl Into<String>) -> Self {
        Self {
            default_provider: Some(provider.into()),
        }
    }
}
