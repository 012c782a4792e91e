//! Browser session lifecycle
//!
//! [`SessionLifecycle::acquire`] launches one browser and opens one page in a
//! fresh isolated context; [`SessionLifecycle::release`] consumes the
//! resulting [`ScenarioContext`] and closes the browser. Ownership is a
//! strict tree: the context owns the browser and the page, primitives only
//! borrow the context for the length of one call.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::browser::{BrowserInstance, BrowserLauncher, PageDriver};
use crate::config::{BrowserProfile, HarnessConfig};
use crate::diagnostics::Artifact;
use crate::error::{HarnessError, HarnessResult};

/// Everything one running scenario owns
pub struct ScenarioContext {
    scenario_id: String,
    config: HarnessConfig,
    browser: Box<dyn BrowserInstance>,
    page: Box<dyn PageDriver>,
    pub(crate) screenshot_counter: u32,
    pub(crate) artifacts: Vec<Artifact>,
    released: bool,
}

impl ScenarioContext {
    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn profile(&self) -> &BrowserProfile {
        &self.config.browser
    }

    /// Directory holding this scenario's diagnostics
    pub fn artifact_dir(&self) -> PathBuf {
        self.config.artifacts_dir.join(&self.scenario_id)
    }

    pub(crate) fn page(&mut self) -> &mut dyn PageDriver {
        self.page.as_mut()
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn take_artifacts(&mut self) -> Vec<Artifact> {
        std::mem::take(&mut self.artifacts)
    }
}

impl Drop for ScenarioContext {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "Scenario context '{}' dropped without release",
                self.scenario_id
            );
        }
    }
}

/// Acquires and releases scenario contexts over one browser backend
#[derive(Clone)]
pub struct SessionLifecycle {
    launcher: Arc<dyn BrowserLauncher>,
}

impl SessionLifecycle {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { launcher }
    }

    /// Launch a browser and open the scenario's page.
    ///
    /// On failure nothing is left running and no context is returned.
    pub async fn acquire(
        &self,
        scenario_id: &str,
        config: &HarnessConfig,
    ) -> HarnessResult<ScenarioContext> {
        info!("Acquiring browser session for '{}'", scenario_id);

        let mut browser = self.launcher.launch(&config.browser).await?;

        let page = match browser.new_isolated_page().await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!("Error closing browser after failed page creation: {}", close_err);
                }
                return Err(match e {
                    HarnessError::Launch(msg) => HarnessError::Launch(msg),
                    other => HarnessError::Launch(format!("could not open page: {}", other)),
                });
            }
        };

        Ok(ScenarioContext {
            scenario_id: scenario_id.to_string(),
            config: config.clone(),
            browser,
            page,
            screenshot_counter: 0,
            artifacts: Vec::new(),
            released: false,
        })
    }

    /// Close the browser owned by `ctx`. Consumes the context, so a context
    /// is released at most once.
    pub async fn release(&self, mut ctx: ScenarioContext) -> HarnessResult<()> {
        debug!("Releasing browser session for '{}'", ctx.scenario_id);
        ctx.released = true;
        ctx.browser.close().await
    }
}
