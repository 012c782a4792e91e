//! Login flow composed from navigation and assertion primitives
//!
//! ```text
//! AwaitingForm ──type──> CredentialsEntered ──Enter──> Submitted
//!                                                       ├─> Authenticated
//!                                                       ├─> ChallengeRequired
//!                                                       └─> Rejected
//! ```
//!
//! The helper reports which terminal state was reached. Only the caller
//! decides whether a challenge or a rejection is what the scenario wanted.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::info;

use crate::assertions::Asserter;
use crate::config::{HarnessConfig, LoginSelectors};
use crate::error::{HarnessError, HarnessResult};
use crate::navigation::{Navigator, TypeOptions, WaitState};
use crate::records::{Credential, LoginOutcome};

/// Selector reported when no terminal login signal shows up.
const OUTCOME_SIGNAL: &str = "login outcome";

#[derive(Debug, Clone)]
pub struct LoginFlowHelper {
    selectors: LoginSelectors,
    login_url: Option<String>,
    ticket_granting_cookie: String,
}

impl LoginFlowHelper {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            selectors: config.login.clone(),
            login_url: None,
            ticket_granting_cookie: config.ticket_granting_cookie.clone(),
        }
    }

    /// Navigate here first when the current page has no login form.
    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = Some(url.into());
        self
    }

    pub fn with_fields(mut self, username_field: &str, password_field: &str) -> Self {
        self.selectors.username_field = username_field.to_string();
        self.selectors.password_field = password_field.to_string();
        self
    }

    pub fn selectors(&self) -> &LoginSelectors {
        &self.selectors
    }

    /// Fill and submit the login form, then classify where it led.
    pub async fn login_with<C>(
        &self,
        ctx: &mut C,
        username: &str,
        password: &str,
    ) -> HarnessResult<LoginOutcome>
    where
        C: Navigator + Asserter,
    {
        let credential = Credential::password(username, password);
        info!("Logging in with {:?}", credential);

        if let Some(ref url) = self.login_url {
            if ctx.query(&self.selectors.username_field).await?.is_none() {
                ctx.goto(url).await?;
            }
        }

        ctx.wait_for_element(&self.selectors.username_field, WaitState::Visible, None)
            .await?;
        ctx.type_text(&self.selectors.username_field, username, TypeOptions::cleared())
            .await?;
        ctx.type_text(&self.selectors.password_field, password, TypeOptions::secret())
            .await?;

        ctx.press_key("Enter").await?;
        ctx.wait_for_navigation(None).await?;

        let outcome = self.await_outcome(ctx).await?;
        info!("Login finished as {}", outcome);
        Ok(outcome)
    }

    /// Type a one-time code into the token field and submit it.
    pub async fn submit_token<C>(
        &self,
        ctx: &mut C,
        selector: &str,
        credential: &Credential,
    ) -> HarnessResult<()>
    where
        C: Navigator,
    {
        let Credential::ScratchCode(code) = credential else {
            return Err(HarnessError::ScenarioParse(
                "token submission needs a one-time code".to_string(),
            ));
        };

        ctx.wait_for_element(selector, WaitState::Visible, None).await?;
        ctx.type_text(selector, code, TypeOptions::secret()).await?;
        ctx.press_key("Enter").await?;
        ctx.wait_for_navigation(None).await
    }

    /// Poll until the page settles on a terminal login state.
    async fn await_outcome<C>(&self, ctx: &mut C) -> HarnessResult<LoginOutcome>
    where
        C: Navigator + Asserter,
    {
        let bound = ctx.profile().wait_timeout();
        let interval = ctx.profile().poll_interval();
        let deadline = Instant::now() + bound;

        loop {
            if let Some(outcome) = self.classify(ctx).await? {
                return Ok(outcome);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(HarnessError::WaitTimeout {
                    selector: OUTCOME_SIGNAL.to_string(),
                    timeout_ms: bound.as_millis() as u64,
                });
            }
            sleep(interval.min(deadline - now).max(Duration::from_millis(1))).await;
        }
    }

    async fn classify<C>(&self, ctx: &mut C) -> HarnessResult<Option<LoginOutcome>>
    where
        C: Navigator + Asserter,
    {
        if ctx.find_cookie(&self.ticket_granting_cookie).await?.is_some() {
            return Ok(Some(LoginOutcome::Authenticated));
        }
        if is_visible(ctx, &self.selectors.rejection).await? {
            return Ok(Some(LoginOutcome::Rejected));
        }
        for challenge in &self.selectors.challenges {
            if is_visible(ctx, challenge).await? {
                return Ok(Some(LoginOutcome::ChallengeRequired));
            }
        }
        Ok(None)
    }
}

async fn is_visible<C: Navigator>(ctx: &mut C, selector: &str) -> HarnessResult<bool> {
    Ok(ctx.query(selector).await?.map(|s| s.visible).unwrap_or(false))
}
