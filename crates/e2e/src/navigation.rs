//! Navigation, interaction and synchronization primitives
//!
//! Every wait here is bounded: by the explicit timeout when one is given,
//! otherwise by the context's [`BrowserProfile`]. Expiry is a terminal
//! failure of the step and is never retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::browser::{ElementState, PageDriver};
use crate::config::BrowserProfile;
use crate::error::{HarnessError, HarnessResult};
use crate::session::ScenarioContext;

/// Condition an element wait resolves on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    /// Present in the DOM
    #[default]
    Attached,
    /// Present and rendered
    Visible,
    /// Absent or not rendered
    Hidden,
    /// Absent
    Detached,
}

impl WaitState {
    pub fn matches(&self, state: Option<&ElementState>) -> bool {
        match self {
            WaitState::Attached => state.is_some(),
            WaitState::Visible => state.map(|s| s.visible).unwrap_or(false),
            WaitState::Hidden => state.map(|s| !s.visible).unwrap_or(true),
            WaitState::Detached => state.is_none(),
        }
    }
}

/// Options for [`Navigator::type_text`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeOptions {
    /// Empty the field before typing
    pub clear_first: bool,
    /// Hide the typed value from logs
    pub obfuscate: bool,
}

impl TypeOptions {
    pub fn cleared() -> Self {
        Self {
            clear_first: true,
            obfuscate: false,
        }
    }

    pub fn secret() -> Self {
        Self {
            clear_first: true,
            obfuscate: true,
        }
    }
}

/// Drives the page of a scenario
#[async_trait]
pub trait Navigator: Send {
    /// Timeouts and poll interval in effect.
    fn profile(&self) -> &BrowserProfile;

    async fn goto(&mut self, url: &str) -> HarnessResult<()>;

    async fn click(&mut self, selector: &str) -> HarnessResult<()>;

    async fn type_text(
        &mut self,
        selector: &str,
        text: &str,
        options: TypeOptions,
    ) -> HarnessResult<()>;

    async fn submit_form(&mut self, selector: &str) -> HarnessResult<()>;

    async fn press_key(&mut self, key: &str) -> HarnessResult<()>;

    /// Suspend until the selector satisfies `state`, or fail with
    /// [`HarnessError::WaitTimeout`].
    async fn wait_for_element(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Option<Duration>,
    ) -> HarnessResult<()>;

    async fn wait_for_navigation(&mut self, timeout: Option<Duration>) -> HarnessResult<()>;

    /// Unconditional delay, for pages with no deterministic signal.
    async fn wait_for_timeout(&mut self, duration: Duration);

    /// Current state of a selector, without waiting.
    async fn query(&mut self, selector: &str) -> HarnessResult<Option<ElementState>>;
}

/// Outcome of polling one selector
pub(crate) enum Polled {
    Satisfied,
    Expired(Option<ElementState>),
}

/// Poll `selector` until `done` holds or `bound` elapses. A driver call that
/// hangs is cut off by the same bound.
pub(crate) async fn poll_element<F>(
    page: &mut dyn PageDriver,
    selector: &str,
    bound: Duration,
    interval: Duration,
    done: F,
) -> HarnessResult<Polled>
where
    F: Fn(Option<&ElementState>) -> bool + Send + Sync,
{
    let deadline = Instant::now() + bound;
    let mut last: Option<ElementState> = None;

    let polled = timeout(bound, async {
        loop {
            let current = page.element_state(selector).await?;
            if done(current.as_ref()) {
                return Ok::<_, HarnessError>(true);
            }
            last = current;

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(interval.min(deadline - now)).await;
        }
    })
    .await;

    match polled {
        Ok(Ok(true)) => Ok(Polled::Satisfied),
        Ok(Ok(false)) | Err(_) => Ok(Polled::Expired(last)),
        Ok(Err(e)) => Err(e),
    }
}

impl ScenarioContext {
    /// Implicit wait shared by click, type and submit: the element must turn
    /// up and become interactable within the profile's element wait.
    async fn locate_interactable(&mut self, selector: &str) -> HarnessResult<()> {
        let bound = self.profile().element_wait();
        let interval = self.profile().poll_interval();

        match poll_element(self.page(), selector, bound, interval, |s| {
            s.map(ElementState::interactable).unwrap_or(false)
        })
        .await?
        {
            Polled::Satisfied => Ok(()),
            Polled::Expired(None) => Err(HarnessError::ElementNotFound {
                selector: selector.to_string(),
            }),
            Polled::Expired(Some(state)) => Err(HarnessError::ElementNotInteractable {
                selector: selector.to_string(),
                reason: if !state.visible { "hidden" } else { "disabled" }.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Navigator for ScenarioContext {
    fn profile(&self) -> &BrowserProfile {
        ScenarioContext::profile(self)
    }

    async fn goto(&mut self, url: &str) -> HarnessResult<()> {
        info!("Navigating to {}", url);
        let bound = self.profile().navigation_timeout();

        match timeout(bound, self.page().goto(url)).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: bound.as_millis() as u64,
            }),
        }
    }

    async fn click(&mut self, selector: &str) -> HarnessResult<()> {
        debug!("Clicking on {}", selector);
        self.locate_interactable(selector).await?;
        self.page().click(selector).await
    }

    async fn type_text(
        &mut self,
        selector: &str,
        text: &str,
        options: TypeOptions,
    ) -> HarnessResult<()> {
        let shown = if options.obfuscate { "******" } else { text };
        info!("Typing {} in field {}", shown, selector);

        self.locate_interactable(selector).await?;
        if options.clear_first {
            self.page().clear(selector).await?;
        }
        self.page().type_text(selector, text).await
    }

    async fn submit_form(&mut self, selector: &str) -> HarnessResult<()> {
        info!("Submitting form {}", selector);
        self.locate_interactable(selector).await?;
        self.page().submit_form(selector).await
    }

    async fn press_key(&mut self, key: &str) -> HarnessResult<()> {
        debug!("Pressing {}", key);
        self.page().press_key(key).await
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Option<Duration>,
    ) -> HarnessResult<()> {
        let bound = timeout.unwrap_or_else(|| self.profile().wait_timeout());
        let interval = self.profile().poll_interval();
        debug!("Waiting for {} ({:?}, {} ms)", selector, state, bound.as_millis());

        match poll_element(self.page(), selector, bound, interval, |s| state.matches(s)).await? {
            Polled::Satisfied => Ok(()),
            Polled::Expired(_) => Err(HarnessError::WaitTimeout {
                selector: selector.to_string(),
                timeout_ms: bound.as_millis() as u64,
            }),
        }
    }

    async fn wait_for_navigation(&mut self, timeout_override: Option<Duration>) -> HarnessResult<()> {
        let bound = timeout_override.unwrap_or_else(|| self.profile().navigation_timeout());

        match timeout(bound, self.page().wait_for_navigation()).await {
            Ok(result) => result,
            Err(_) => {
                let url = self.page().url().await.unwrap_or_default();
                Err(HarnessError::NavigationTimeout {
                    url,
                    timeout_ms: bound.as_millis() as u64,
                })
            }
        }
    }

    async fn wait_for_timeout(&mut self, duration: Duration) {
        warn!("Fixed delay of {} ms", duration.as_millis());
        sleep(duration).await;
    }

    async fn query(&mut self, selector: &str) -> HarnessResult<Option<ElementState>> {
        self.page().element_state(selector).await
    }
}
