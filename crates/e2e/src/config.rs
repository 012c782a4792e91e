//! Harness configuration
//!
//! Built once at process start (file, then flags and environment) and passed
//! down explicitly to the session, probe and login helpers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Name of the CAS ticket-granting cookie.
pub const DEFAULT_TICKET_GRANTING_COOKIE: &str = "TGC";

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Browser launch profile
    pub browser: BrowserProfile,

    /// HTTP probe settings
    pub probe: ProbeConfig,

    /// Selectors used by the login helper
    pub login: LoginSelectors,

    /// Root directory for screenshots, logs and reports
    pub artifacts_dir: PathBuf,

    /// Cookie whose presence means a login succeeded
    pub ticket_granting_cookie: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            browser: BrowserProfile::default(),
            probe: ProbeConfig::default(),
            login: LoginSelectors::default(),
            artifacts_dir: PathBuf::from("test-results"),
            ticket_granting_cookie: DEFAULT_TICKET_GRANTING_COOKIE.to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load a configuration file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::MissingConfiguration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> HarnessResult<Self> {
        toml::from_str(content).map_err(HarnessError::from)
    }
}

/// Browser launch profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserProfile {
    pub headless: bool,
    pub ignore_certificate_errors: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Upper bound for a page load
    pub navigation_timeout_ms: u64,

    /// Upper bound for explicit element waits
    pub wait_timeout_ms: u64,

    /// Implicit wait used by click and type before giving up on a selector
    pub element_wait_ms: u64,

    /// Delay between two polls of page state
    pub poll_interval_ms: u64,

    pub chrome_executable: Option<PathBuf>,
    pub no_sandbox: bool,
    pub extra_args: Vec<String>,
}

impl Default for BrowserProfile {
    fn default() -> Self {
        Self {
            headless: true,
            ignore_certificate_errors: true,
            viewport_width: 1920,
            viewport_height: 1080,
            navigation_timeout_ms: 30_000,
            wait_timeout_ms: 30_000,
            element_wait_ms: 2_000,
            poll_interval_ms: 100,
            chrome_executable: None,
            no_sandbox: false,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserProfile {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_millis(self.element_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// HTTP probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub request_timeout_ms: u64,

    /// Accept self-signed certificates of the server under test
    pub accept_invalid_certs: bool,

    /// Return non-2xx bodies instead of failing
    pub tolerate_non_success: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            accept_invalid_certs: true,
            tolerate_non_success: false,
        }
    }
}

/// Selectors of the login form and of the pages that can follow it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSelectors {
    pub username_field: String,
    pub password_field: String,

    /// Shown when the server rejects the credentials
    pub rejection: String,

    /// Any of these means a multifactor challenge is pending
    pub challenges: Vec<String>,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            username_field: "#username".to_string(),
            password_field: "#password".to_string(),
            rejection: "#loginErrorsPanel".to_string(),
            challenges: vec!["#token".to_string(), "#vaContainer".to_string()],
        }
    }
}

/// Named configuration values (credentials, hosts) available to scenarios.
///
/// Snapshot taken once; lookups never touch the process environment.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the process environment.
    pub fn from_env() -> Self {
        Self {
            values: std::env::vars().collect(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Look up a required value, failing fast when absent.
    pub fn require(&self, name: &str) -> HarnessResult<&str> {
        self.get(name)
            .ok_or_else(|| HarnessError::MissingConfiguration(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Parse a `NAME=VALUE` override.
    pub fn parse_assignment(raw: &str) -> HarnessResult<(String, String)> {
        match raw.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => Err(HarnessError::ScenarioParse(format!(
                "expected NAME=VALUE, got '{}'",
                raw
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
artifacts_dir = "out"

[browser]
headless = false
wait_timeout_ms = 5000
"#,
        )
        .unwrap();
        assert!(!config.browser.headless);
        assert_eq!(config.browser.wait_timeout_ms, 5000);
        assert_eq!(config.browser.navigation_timeout_ms, 30_000);
        assert_eq!(config.artifacts_dir, PathBuf::from("out"));
        assert_eq!(config.ticket_granting_cookie, "TGC");
        assert_eq!(config.login.username_field, "#username");
    }

    #[test]
    fn test_require_missing_variable() {
        let vars = Variables::new().with("ADFS_USERNAME", "alice");
        assert_eq!(vars.require("ADFS_USERNAME").unwrap(), "alice");
        match vars.require("ADFS_PASSWORD") {
            Err(HarnessError::MissingConfiguration(name)) => assert_eq!(name, "ADFS_PASSWORD"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_assignment() {
        let (name, value) = Variables::parse_assignment("CAS_HOST=https://localhost:8443").unwrap();
        assert_eq!(name, "CAS_HOST");
        assert_eq!(value, "https://localhost:8443");
        assert!(Variables::parse_assignment("novalue").is_err());
        assert!(Variables::parse_assignment("=x").is_err());
    }
}
