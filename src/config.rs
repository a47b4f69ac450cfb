//! Runtime configuration.
//!
//! Both structures are plain data with documented defaults. They are filled
//! in from the command line (see `main.rs`) and checked once at startup.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;

/// Fraction of the candidate pool requested on every assignment.
pub const DEFAULT_PROPORTION: f64 = 0.3;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
/// How long in-flight deliveries may run once shutdown has started.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct AssignConfig {
    /// Fraction of the candidate pool to request, see [`crate::sample`].
    ///
    /// Defaults to [`DEFAULT_PROPORTION`].
    pub proportion: f64,
    /// Select reviewers and log them without requesting them.
    pub dry_run: bool,
}

impl Default for AssignConfig {
    fn default() -> Self {
        AssignConfig {
            proportion: DEFAULT_PROPORTION,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Defaults to all interfaces.
    pub host: String,
    pub port: u16,
    /// Secret shared with GitHub for signing deliveries, from
    /// `GITHUB_WEBHOOK_SECRET`.
    pub webhook_secret: Option<SecretString>,
    /// Skips signature validation. Anyone who can reach the server can then
    /// trigger assignments, so this is only meant for local testing.
    pub insecure: bool,
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            webhook_secret: None,
            insecure: false,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_secret = self
            .webhook_secret
            .as_ref()
            .is_some_and(|s| !s.expose_secret().is_empty());
        if !self.insecure && !has_secret {
            return Err(ConfigError::MissingWebhookSecret);
        }
        Ok(())
    }

    /// The secret deliveries are checked against, or `None` when checking is
    /// disabled.
    pub fn signing_secret(&self) -> Option<SecretString> {
        if self.insecure {
            None
        } else {
            self.webhook_secret.clone()
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingWebhookSecret,
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::MissingWebhookSecret => write!(
                f,
                "GITHUB_WEBHOOK_SECRET is required to validate webhook deliveries \
                 (pass --insecure to skip validation)"
            ),
        }
    }
}
