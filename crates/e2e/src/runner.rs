//! Scenario runner: acquire, execute steps, capture diagnostics, release

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::assertions::Asserter;
use crate::browser::BrowserLauncher;
use crate::config::{HarnessConfig, Variables};
use crate::diagnostics::{Artifact, Logger, PageSnapshot};
use crate::error::{HarnessError, HarnessResult};
use crate::login::LoginFlowHelper;
use crate::navigation::{Navigator, TypeOptions};
use crate::probe::{pointer, scalar_text, HttpProbe, Prober, RequestOptions};
use crate::records::{AuthenticationResult, Credential, TrustedDeviceRecord};
use crate::scenario::{interpolate, Scenario, Step};
use crate::session::{ScenarioContext, SessionLifecycle};

/// File name of the per-scenario report
pub const REPORT_FILE: &str = "report.json";

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

/// Why a scenario did not pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: String,
    pub message: String,

    /// Failed before any step could run (configuration, launch, parse)
    pub setup: bool,
}

impl From<&HarnessError> for FailureReport {
    fn from(e: &HarnessError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
            setup: e.is_setup(),
        }
    }
}

/// Outcome of one scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub failure: Option<FailureReport>,
    pub last_page: Option<PageSnapshot>,
    pub artifacts: Vec<Artifact>,
    pub authentication: AuthenticationResult,
}

impl ScenarioReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            started_at: Utc::now(),
            duration_ms: 0,
            steps: Vec::new(),
            failure: None,
            last_page: None,
            artifacts: Vec::new(),
            authentication: AuthenticationResult::default(),
        }
    }

    fn fail(&mut self, e: &HarnessError) {
        self.success = false;
        self.failure = Some(FailureReport::from(e));
    }

    /// Process exit status: 0 pass, 1 test failure, 2 setup failure
    pub fn exit_code(&self) -> i32 {
        match self.failure {
            None if self.success => 0,
            Some(ref f) if f.setup => 2,
            _ => 1,
        }
    }

    /// Write the report as `<artifacts_dir>/<name>/report.json`.
    pub fn write(&self, artifacts_dir: &Path) -> HarnessResult<PathBuf> {
        let dir = artifacts_dir.join(&self.name);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(REPORT_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Report written to: {}", path.display());
        Ok(path)
    }

    /// Like [`ScenarioReport::write`], but a write failure is only logged.
    pub fn persist(&self, artifacts_dir: &Path) -> Option<PathBuf> {
        match self.write(artifacts_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to write report for {}: {}", self.name, e);
                None
            }
        }
    }
}

/// Runs scenarios against fresh browser sessions
pub struct ScenarioRunner {
    config: HarnessConfig,
    variables: Variables,
    lifecycle: SessionLifecycle,
    prober: Arc<dyn Prober>,
}

impl ScenarioRunner {
    pub fn new(
        config: HarnessConfig,
        variables: Variables,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> HarnessResult<Self> {
        let prober = Arc::new(HttpProbe::new(&config.probe)?);
        Ok(Self {
            config,
            variables,
            lifecycle: SessionLifecycle::new(launcher),
            prober,
        })
    }

    /// Replace the HTTP probe
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run one scenario. Never fails: every failure ends up in the report.
    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let start = Instant::now();
        let mut report = ScenarioReport::new(&scenario.name);
        info!("Running scenario: {}", scenario.name);

        let missing = scenario.unresolved(&self.variables);
        if !missing.is_empty() {
            let e = HarnessError::MissingConfiguration(missing.join(", "));
            error!("✗ {} - {}", scenario.name, e);
            report.fail(&e);
            report.duration_ms = start.elapsed().as_millis() as u64;
            return report;
        }

        let mut config = self.config.clone();
        scenario.browser.apply(&mut config.browser);

        let mut ctx = match self.lifecycle.acquire(&scenario.name, &config).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("✗ {} - {}", scenario.name, e);
                report.fail(&e);
                report.duration_ms = start.elapsed().as_millis() as u64;
                return report;
            }
        };

        let mut executor = StepExecutor::new(&config, self.variables.clone(), self.prober.clone());
        let outcome = executor
            .run_steps(&mut ctx, &scenario.steps, &mut report.steps)
            .await;

        if outcome.is_err() {
            ctx.screenshot().await;
            ctx.log_page().await;
        }
        report.last_page = Some(ctx.snapshot_page().await);
        report.artifacts = ctx.take_artifacts();
        report.authentication = executor.authentication;

        let released = self.lifecycle.release(ctx).await;
        let outcome = outcome.and(released);

        report.duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                report.success = true;
                info!("✓ {} ({} ms)", report.name, report.duration_ms);
            }
            Err(e) => {
                error!("✗ {} - {}", report.name, e);
                report.fail(&e);
            }
        }
        report
    }
}

/// Per-run step state: variable bindings, login helper, observations
struct StepExecutor {
    bindings: Variables,
    login: LoginFlowHelper,
    prober: Arc<dyn Prober>,
    authentication: AuthenticationResult,
}

impl StepExecutor {
    fn new(config: &HarnessConfig, bindings: Variables, prober: Arc<dyn Prober>) -> Self {
        Self {
            bindings,
            login: LoginFlowHelper::from_config(config),
            prober,
            authentication: AuthenticationResult::default(),
        }
    }

    /// Execute steps in order, stopping at the first failure.
    async fn run_steps(
        &mut self,
        ctx: &mut ScenarioContext,
        steps: &[Step],
        results: &mut Vec<StepResult>,
    ) -> HarnessResult<()> {
        for (index, step) in steps.iter().enumerate() {
            let name = step.name();
            debug!("Step {}: {}", index + 1, name);
            let start = Instant::now();

            let result = self.execute(ctx, step).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(screenshot_path) => results.push(StepResult {
                    name,
                    success: true,
                    duration_ms,
                    error: None,
                    screenshot_path,
                }),
                Err(e) => {
                    results.push(StepResult {
                        name,
                        success: false,
                        duration_ms,
                        error: Some(e.to_string()),
                        screenshot_path: None,
                    });
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn text(&self, template: &str) -> HarnessResult<String> {
        interpolate(template, &self.bindings)
    }

    async fn execute(
        &mut self,
        ctx: &mut ScenarioContext,
        step: &Step,
    ) -> HarnessResult<Option<PathBuf>> {
        match step {
            Step::Navigate {
                url,
                wait_for_selector,
            } => {
                ctx.goto(&self.text(url)?).await?;
                if let Some(selector) = wait_for_selector {
                    ctx.wait_for_element(&self.text(selector)?, Default::default(), None)
                        .await?;
                }
            }

            Step::Click { selector } => ctx.click(selector).await?,

            Step::Type {
                selector,
                text,
                clear_first,
                obfuscate,
            } => {
                let options = TypeOptions {
                    clear_first: *clear_first,
                    obfuscate: *obfuscate,
                };
                ctx.type_text(selector, &self.text(text)?, options).await?;
            }

            Step::SubmitForm { selector } => ctx.submit_form(selector).await?,

            Step::Press { key } => ctx.press_key(key).await?,

            Step::Wait {
                selector,
                state,
                timeout_ms,
            } => {
                ctx.wait_for_element(selector, *state, timeout_ms.map(Duration::from_millis))
                    .await?;
            }

            Step::WaitForNavigation { timeout_ms } => {
                ctx.wait_for_navigation(timeout_ms.map(Duration::from_millis))
                    .await?;
            }

            Step::Sleep { ms } => ctx.wait_for_timeout(Duration::from_millis(*ms)).await,

            Step::Login {
                username,
                password,
                url,
                username_field,
                password_field,
                expect,
            } => {
                let mut helper = self.login.clone();
                if let Some(url) = url {
                    helper = helper.with_login_url(self.text(url)?);
                }
                if username_field.is_some() || password_field.is_some() {
                    let defaults = helper.selectors().clone();
                    helper = helper.with_fields(
                        username_field.as_deref().unwrap_or(&defaults.username_field),
                        password_field.as_deref().unwrap_or(&defaults.password_field),
                    );
                }

                let outcome = helper
                    .login_with(ctx, &self.text(username)?, &self.text(password)?)
                    .await?;
                self.authentication.outcome = Some(outcome);
                if outcome != *expect {
                    return Err(ctx
                        .failure(format!("login ended as {}, expected {}", outcome, expect))
                        .await);
                }
            }

            Step::SubmitToken { selector, code } => {
                let credential = Credential::scratch_code(self.text(code)?);
                self.login.submit_token(ctx, selector, &credential).await?;
            }

            Step::AssertVisible { selector } => ctx.assert_visibility(selector).await?,

            Step::AssertTextContains { selector, text } => {
                ctx.assert_inner_text_contains(selector, &self.text(text)?)
                    .await?;
            }

            Step::AssertTextEquals { selector, text } => {
                ctx.assert_inner_text_equals(selector, &self.text(text)?)
                    .await?;
            }

            Step::AssertTicketGrantingCookie => {
                ctx.assert_ticket_granting_cookie().await?;
                self.authentication.session_cookie = true;
            }

            Step::AssertNoTicketGrantingCookie => {
                ctx.assert_no_ticket_granting_cookie().await?;
                self.authentication.session_cookie = false;
            }

            Step::Screenshot => return Ok(ctx.screenshot().await),

            Step::LogPage => {
                ctx.log_page().await;
            }

            Step::Log { message } => info!("{}", self.text(message)?),

            Step::LogJson { selector } => {
                let html = ctx.inner_html(selector).await?;
                let payload: serde_json::Value = match serde_json::from_str(html.trim()) {
                    Ok(payload) => payload,
                    Err(e) => return Err(ctx.failure(format!("{} is not JSON: {}", selector, e)).await),
                };
                info!("{}", serde_json::to_string_pretty(&payload)?);
                let count = self.authentication.absorb_attributes(&payload);
                debug!("Collected {} attribute(s) from {}", count, selector);
            }

            Step::Probe {
                url,
                method,
                headers,
                body,
                tolerate_non_success,
                capture,
                require_non_null,
            } => {
                let url = self.text(url)?;
                let mut options = RequestOptions::default();
                if let Some(method) = method {
                    options = options.method(RequestOptions::parse_method(method)?);
                }
                for (name, value) in headers {
                    options = options.header(name.clone(), self.text(value)?);
                }
                if let Some(body) = body {
                    options = options.body(self.text(body)?);
                }
                if let Some(tolerate) = tolerate_non_success {
                    options = options.tolerate_non_success(*tolerate);
                }

                let payload = self.prober.do_request(&url, options).await?.json()?;

                for path in require_non_null {
                    if pointer(&payload, path).is_none() {
                        return Err(HarnessError::probe(&url, format!("{} is null or missing", path)));
                    }
                }
                for (name, path) in capture {
                    let value = pointer(&payload, path).ok_or_else(|| {
                        HarnessError::probe(&url, format!("nothing to capture at {}", path))
                    })?;
                    debug!("Captured {} from {}", name, path);
                    self.bindings.insert(name.clone(), scalar_text(value));
                }
            }

            Step::ProbeTrustedDevices { url, min_records } => {
                let url = self.text(url)?;
                let payload = self.prober.get_json(&url).await?;
                let records = TrustedDeviceRecord::list_from_json(&url, &payload, *min_records)?;
                if records.len() < *min_records {
                    return Err(HarnessError::probe(
                        &url,
                        format!(
                            "expected at least {} trusted device(s), found {}",
                            min_records,
                            records.len()
                        ),
                    ));
                }
                for record in &records {
                    info!("Trusted device {} named '{}'", record.id, record.name);
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(failure: Option<HarnessError>) -> ScenarioReport {
        let mut report = ScenarioReport::new("mfa-inwebo-va");
        match failure {
            Some(e) => report.fail(&e),
            None => report.success = true,
        }
        report
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(report_with(None).exit_code(), 0);
        assert_eq!(
            report_with(Some(HarnessError::ElementNotFound {
                selector: "#vaContainer".into()
            }))
            .exit_code(),
            1
        );
        assert_eq!(
            report_with(Some(HarnessError::Launch("no chrome".into()))).exit_code(),
            2
        );
    }

    #[test]
    fn test_report_written_under_scenario_dir() {
        let dir = tempfile::tempdir().unwrap();
        let report = report_with(None);
        let path = report.write(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("mfa-inwebo-va").join(REPORT_FILE));

        let parsed: ScenarioReport =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert!(parsed.success);
    }

    #[test]
    fn test_unwritable_report_keeps_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("artifacts");
        std::fs::write(&blocker, "not a directory").unwrap();

        let report = report_with(None);
        assert!(report.write(&blocker).is_err());
        assert!(report.persist(&blocker).is_none());
        assert_eq!(report.exit_code(), 0);
    }
}
