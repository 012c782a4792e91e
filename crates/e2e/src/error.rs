//! Error types for scenario execution

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Browser failed to launch: {0}")]
    Launch(String),

    #[error("Navigation to {url} did not complete within {timeout_ms} ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("Timeout waiting for {selector} after {timeout_ms} ms")]
    WaitTimeout { selector: String, timeout_ms: u64 },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Element not interactable: {selector} ({reason})")]
    ElementNotInteractable { selector: String, reason: String },

    #[error("Assertion failed: {message} [url: {url}, title: {title}]")]
    AssertionFailure {
        message: String,
        url: String,
        title: String,
    },

    #[error("Session cookie {cookie} missing at {url}")]
    SessionCookieMissing { cookie: String, url: String },

    #[error("Probe of {url} failed: {reason}")]
    Probe { url: String, reason: String },

    #[error("Missing configuration value: {0}")]
    MissingConfiguration(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HarnessError {
    /// Stable name of the failure kind, as written to reports.
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::Launch(_) => "launch_error",
            HarnessError::NavigationTimeout { .. } => "navigation_timeout",
            HarnessError::WaitTimeout { .. } => "wait_timeout",
            HarnessError::ElementNotFound { .. } => "element_not_found",
            HarnessError::ElementNotInteractable { .. } => "element_not_interactable",
            HarnessError::AssertionFailure { .. } => "assertion_failure",
            HarnessError::SessionCookieMissing { .. } => "session_cookie_missing",
            HarnessError::Probe { .. } => "probe_error",
            HarnessError::MissingConfiguration(_) => "missing_configuration",
            HarnessError::Browser(_) => "browser_error",
            HarnessError::ScenarioParse(_) => "scenario_parse",
            HarnessError::Io(_) => "io_error",
            HarnessError::Json(_) => "json_error",
            HarnessError::Yaml(_) => "yaml_error",
            HarnessError::Toml(_) => "config_error",
            HarnessError::Http(_) => "http_error",
        }
    }

    /// Whether the error happened before any test logic could run.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            HarnessError::Launch(_)
                | HarnessError::MissingConfiguration(_)
                | HarnessError::ScenarioParse(_)
                | HarnessError::Yaml(_)
                | HarnessError::Toml(_)
        )
    }

    pub(crate) fn probe(url: &str, reason: impl Into<String>) -> Self {
        HarnessError::Probe {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_errors_are_classified() {
        assert!(HarnessError::MissingConfiguration("ADFS_USERNAME".into()).is_setup());
        assert!(HarnessError::Launch("no chrome".into()).is_setup());
        assert!(!HarnessError::SessionCookieMissing {
            cookie: "TGC".into(),
            url: "https://localhost:8443/cas/login".into(),
        }
        .is_setup());
    }

    #[test]
    fn test_assertion_failure_message_includes_page() {
        let err = HarnessError::AssertionFailure {
            message: "expected text".into(),
            url: "https://localhost:8443/cas/login".into(),
            title: "CAS".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("https://localhost:8443/cas/login"));
        assert!(msg.contains("CAS"));
        assert_eq!(err.kind(), "assertion_failure");
    }
}
