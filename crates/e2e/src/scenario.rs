//! Declarative YAML scenario definitions

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::{BrowserProfile, Variables};
use crate::error::{HarnessError, HarnessResult};
use crate::navigation::WaitState;
use crate::records::LoginOutcome;

/// File looked up when a scenario is given as a directory
pub const SCENARIO_FILE: &str = "scenario.yaml";

/// One authentication flow, parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name, also used to key artifacts. Defaults to the file or
    /// directory name.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Per-scenario browser overrides
    #[serde(default)]
    pub browser: BrowserOverrides,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserOverrides {
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

impl BrowserOverrides {
    pub fn apply(&self, profile: &mut BrowserProfile) {
        if let Some(headless) = self.headless {
            profile.headless = headless;
        }
        if let Some(ref viewport) = self.viewport {
            profile.viewport_width = viewport.width;
            profile.viewport_height = viewport.height;
        }
        if let Some(ms) = self.wait_timeout_ms {
            profile.wait_timeout_ms = ms;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// A single step of a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Load a URL
    Navigate {
        url: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    Click {
        selector: String,
    },

    /// Type into an input field
    Type {
        selector: String,
        text: String,
        #[serde(default)]
        clear_first: bool,
        #[serde(default)]
        obfuscate: bool,
    },

    SubmitForm {
        selector: String,
    },

    /// Press a key on the focused element
    Press {
        key: String,
    },

    /// Wait for an element to reach a state
    Wait {
        selector: String,
        #[serde(default)]
        state: WaitState,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    WaitForNavigation {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep {
        ms: u64,
    },

    /// Fill the login form and check where it led
    Login {
        username: String,
        password: String,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        username_field: Option<String>,
        #[serde(default)]
        password_field: Option<String>,
        #[serde(default)]
        expect: LoginOutcome,
    },

    /// Submit a one-time code on a multifactor page
    SubmitToken {
        #[serde(default = "default_token_field")]
        selector: String,
        code: String,
    },

    AssertVisible {
        selector: String,
    },

    AssertTextContains {
        selector: String,
        text: String,
    },

    AssertTextEquals {
        selector: String,
        text: String,
    },

    AssertTicketGrantingCookie,

    AssertNoTicketGrantingCookie,

    Screenshot,

    LogPage,

    /// Log a message (for debugging)
    Log {
        message: String,
    },

    /// Parse an element's inner HTML as JSON, log it and keep any
    /// released attributes it lists
    LogJson {
        selector: String,
    },

    /// Call a management endpoint and capture values from its JSON body
    Probe {
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        tolerate_non_success: Option<bool>,
        /// Variable name to JSON pointer
        #[serde(default)]
        capture: BTreeMap<String, String>,
        /// JSON pointers that must resolve to non-null values
        #[serde(default)]
        require_non_null: Vec<String>,
    },

    /// Fetch the trusted device registry and validate its records
    ProbeTrustedDevices {
        url: String,
        #[serde(default = "default_min_records")]
        min_records: usize,
    },
}

/// Scenario names become artifact directory names: one path component only.
fn check_name(name: &str) -> HarnessResult<()> {
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(HarnessError::ScenarioParse(format!(
            "scenario name '{}' must be a single path component",
            name
        )));
    }
    Ok(())
}

fn default_token_field() -> String {
    "#token".to_string()
}

fn default_min_records() -> usize {
    1
}

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Names referenced as `${NAME}` in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Replace every `${NAME}` in `template` with its value.
pub fn interpolate(template: &str, vars: &Variables) -> HarnessResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        out.push_str(vars.require(name.as_str())?);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

impl Step {
    /// Short label used in logs and reports
    pub fn name(&self) -> String {
        match self {
            Step::Navigate { url, .. } => format!("navigate:{}", url),
            Step::Click { selector } => format!("click:{}", selector),
            Step::Type { selector, .. } => format!("type:{}", selector),
            Step::SubmitForm { selector } => format!("submit_form:{}", selector),
            Step::Press { key } => format!("press:{}", key),
            Step::Wait { selector, .. } => format!("wait:{}", selector),
            Step::WaitForNavigation { .. } => "wait_for_navigation".to_string(),
            Step::Sleep { ms } => format!("sleep:{}ms", ms),
            Step::Login { username, .. } => format!("login:{}", username),
            Step::SubmitToken { selector, .. } => format!("submit_token:{}", selector),
            Step::AssertVisible { selector } => format!("assert_visible:{}", selector),
            Step::AssertTextContains { selector, .. } => {
                format!("assert_text_contains:{}", selector)
            }
            Step::AssertTextEquals { selector, .. } => format!("assert_text_equals:{}", selector),
            Step::AssertTicketGrantingCookie => "assert_ticket_granting_cookie".to_string(),
            Step::AssertNoTicketGrantingCookie => "assert_no_ticket_granting_cookie".to_string(),
            Step::Screenshot => "screenshot".to_string(),
            Step::LogPage => "log_page".to_string(),
            Step::Log { message } => {
                let cut: String = message.chars().take(30).collect();
                format!("log:{}", cut)
            }
            Step::LogJson { selector } => format!("log_json:{}", selector),
            Step::Probe { url, .. } => format!("probe:{}", url),
            Step::ProbeTrustedDevices { url, .. } => format!("probe_trusted_devices:{}", url),
        }
    }

    /// String fields that may hold `${NAME}` placeholders
    fn templates(&self) -> Vec<&str> {
        match self {
            Step::Navigate {
                url,
                wait_for_selector,
            } => {
                let mut t = vec![url.as_str()];
                t.extend(wait_for_selector.as_deref());
                t
            }
            Step::Type { text, .. } => vec![text.as_str()],
            Step::Login {
                username,
                password,
                url,
                ..
            } => {
                let mut t = vec![username.as_str(), password.as_str()];
                t.extend(url.as_deref());
                t
            }
            Step::SubmitToken { code, .. } => vec![code.as_str()],
            Step::AssertTextContains { text, .. } | Step::AssertTextEquals { text, .. } => {
                vec![text.as_str()]
            }
            Step::Log { message } => vec![message.as_str()],
            Step::Probe {
                url, headers, body, ..
            } => {
                let mut t = vec![url.as_str()];
                t.extend(headers.values().map(String::as_str));
                t.extend(body.as_deref());
                t
            }
            Step::ProbeTrustedDevices { url, .. } => vec![url.as_str()],
            _ => Vec::new(),
        }
    }

    /// Variable names this step defines for later steps
    fn captures(&self) -> Vec<&str> {
        match self {
            Step::Probe { capture, .. } => capture.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

impl Scenario {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        if scenario.steps.is_empty() {
            return Err(HarnessError::ScenarioParse(format!(
                "scenario '{}' has no steps",
                scenario.name
            )));
        }
        if !scenario.name.is_empty() {
            check_name(&scenario.name)?;
        }
        Ok(scenario)
    }

    /// Load a scenario from a YAML file, or from a directory holding
    /// [`SCENARIO_FILE`]
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let file = if path.is_dir() {
            path.join(SCENARIO_FILE)
        } else {
            path.to_path_buf()
        };
        let content = std::fs::read_to_string(&file).map_err(|e| {
            HarnessError::ScenarioParse(format!("cannot read {}: {}", file.display(), e))
        })?;
        let mut scenario = Self::from_yaml(&content)?;

        if scenario.name.is_empty() {
            let source = if path.is_dir() { Some(path) } else { file.parent() };
            let fallback = if file.file_stem().map(|s| s == "scenario").unwrap_or(false) {
                source.and_then(|p| p.file_name())
            } else {
                file.file_stem()
            };
            scenario.name = fallback
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "scenario".to_string());
            check_name(&scenario.name)?;
        }
        Ok(scenario)
    }

    /// Load every scenario below `root`, sorted by name. A scenario is a
    /// [`SCENARIO_FILE`] in any subdirectory.
    pub fn discover(root: &Path) -> HarnessResult<Vec<Self>> {
        let mut scenarios = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| {
                HarnessError::ScenarioParse(format!("cannot walk {}: {}", root.display(), e))
            })?;
            if entry.file_type().is_file() && entry.file_name() == SCENARIO_FILE {
                if let Some(dir) = entry.path().parent() {
                    scenarios.push(Self::load(dir)?);
                }
            }
        }
        scenarios.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(scenarios)
    }

    /// Resolve a scenario argument: an existing path is loaded directly,
    /// anything else is looked up by name below `root`.
    pub fn resolve(arg: &str, root: &Path) -> HarnessResult<Self> {
        let path = Path::new(arg);
        if path.exists() {
            return Self::load(path);
        }
        Self::discover(root)?
            .into_iter()
            .find(|s| s.name == arg)
            .ok_or_else(|| {
                HarnessError::ScenarioParse(format!(
                    "scenario '{}' not found under {}",
                    arg,
                    root.display()
                ))
            })
    }

    /// Placeholders that neither `vars` nor an earlier probe capture can
    /// satisfy, in first-use order.
    pub fn unresolved(&self, vars: &Variables) -> Vec<String> {
        let mut captured: BTreeSet<&str> = BTreeSet::new();
        let mut missing: Vec<String> = Vec::new();

        for step in &self.steps {
            for template in step.templates() {
                for name in placeholders(template) {
                    if !vars.contains(name)
                        && !captured.contains(name)
                        && !missing.iter().any(|m| m == name)
                    {
                        missing.push(name.to_string());
                    }
                }
            }
            captured.extend(step.captures());
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUSTED_DEVICE: &str = r#"
name: mfa-trusted-device-auto-naming
tags: [mfa, gauth]
steps:
  - action: probe
    url: https://localhost:8443/cas/actuator/gauthCredentialRepository/casuser
    capture:
      SCRATCH_CODE: /0/scratchCodes/0
  - action: navigate
    url: https://localhost:8443/cas/login
  - action: login
    username: casuser
    password: Mellon
    expect: challenge_required
  - action: submit_token
    code: ${SCRATCH_CODE}
  - action: assert_text_equals
    selector: '#content div h2'
    text: Log In Successful
  - action: assert_ticket_granting_cookie
  - action: probe_trusted_devices
    url: ${CAS_HOST}/cas/actuator/multifactorTrustedDevices
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_yaml(TRUSTED_DEVICE).unwrap();
        assert_eq!(scenario.name, "mfa-trusted-device-auto-naming");
        assert_eq!(scenario.steps.len(), 7);
        match &scenario.steps[2] {
            Step::Login { expect, .. } => assert_eq!(*expect, LoginOutcome::ChallengeRequired),
            other => panic!("unexpected step {:?}", other),
        }
        match &scenario.steps[3] {
            Step::SubmitToken { selector, .. } => assert_eq!(selector, "#token"),
            other => panic!("unexpected step {:?}", other),
        }
        assert!(matches!(scenario.steps[5], Step::AssertTicketGrantingCookie));
    }

    #[test]
    fn test_captures_satisfy_later_placeholders() {
        let scenario = Scenario::from_yaml(TRUSTED_DEVICE).unwrap();
        assert_eq!(scenario.unresolved(&Variables::new()), vec!["CAS_HOST"]);
        let vars = Variables::new().with("CAS_HOST", "https://localhost:8443");
        assert!(scenario.unresolved(&vars).is_empty());
    }

    #[test]
    fn test_capture_after_use_is_unresolved() {
        let yaml = r#"
name: order
steps:
  - action: type
    selector: '#token'
    text: ${CODE}
  - action: probe
    url: http://localhost/codes
    capture:
      CODE: /0
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.unresolved(&Variables::new()), vec!["CODE"]);
    }

    #[test]
    fn test_interpolate() {
        let vars = Variables::new()
            .with("ADFS_USERNAME", "alice")
            .with("HOST", "localhost:9443");
        assert_eq!(
            interpolate("http://${HOST}/login?u=${ADFS_USERNAME}", &vars).unwrap(),
            "http://localhost:9443/login?u=alice"
        );
        assert_eq!(interpolate("no placeholders", &vars).unwrap(), "no placeholders");
        assert!(matches!(
            interpolate("${MISSING}", &vars),
            Err(HarnessError::MissingConfiguration(_))
        ));
    }

    #[test]
    fn test_empty_steps_rejected() {
        assert!(Scenario::from_yaml("name: empty\nsteps: []\n").is_err());
    }

    #[test]
    fn test_name_must_be_single_path_component() {
        for name in ["../escape", "nested/name", "..", "win\\name"] {
            let yaml = format!("name: '{}'\nsteps:\n  - action: screenshot\n", name);
            match Scenario::from_yaml(&yaml) {
                Err(HarnessError::ScenarioParse(message)) => assert!(message.contains(name)),
                other => panic!("expected parse error for {}, got {:?}", name, other),
            }
        }
        assert!(Scenario::from_yaml("name: mfa-inwebo-va\nsteps:\n  - action: screenshot\n").is_ok());
    }

    #[test]
    fn test_load_directory_defaults_name() {
        let dir = tempfile::tempdir().unwrap();
        let scenario_dir = dir.path().join("mfa-inwebo-va");
        std::fs::create_dir_all(&scenario_dir).unwrap();
        std::fs::write(
            scenario_dir.join(SCENARIO_FILE),
            "steps:\n  - action: screenshot\n",
        )
        .unwrap();

        let scenario = Scenario::load(&scenario_dir).unwrap();
        assert_eq!(scenario.name, "mfa-inwebo-va");
    }

    #[test]
    fn test_resolve_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["mfa-inwebo-va", "adfs-login-saml2-sp"] {
            let scenario_dir = dir.path().join(name);
            std::fs::create_dir_all(&scenario_dir).unwrap();
            std::fs::write(
                scenario_dir.join(SCENARIO_FILE),
                "steps:\n  - action: log_page\n",
            )
            .unwrap();
        }

        let all = Scenario::discover(dir.path()).unwrap();
        let names: Vec<&str> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["adfs-login-saml2-sp", "mfa-inwebo-va"]);

        let found = Scenario::resolve("mfa-inwebo-va", dir.path()).unwrap();
        assert_eq!(found.name, "mfa-inwebo-va");
        assert!(Scenario::resolve("nope", dir.path()).is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let mut profile = BrowserProfile::default();
        BrowserOverrides {
            headless: Some(false),
            viewport: Some(Viewport {
                width: 1280,
                height: 720,
            }),
            wait_timeout_ms: None,
        }
        .apply(&mut profile);
        assert!(!profile.headless);
        assert_eq!(profile.viewport_width, 1280);
        assert_eq!(profile.wait_timeout_ms, 30_000);
    }
}
