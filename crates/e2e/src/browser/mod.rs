//! Browser capability set
//!
//! The harness only talks to a browser through these traits. A backend
//! provides a launcher, the launcher yields a browser instance, and the
//! instance yields one page inside a fresh isolated browsing context.
//!
//! ```text
//! BrowserLauncher ──launch──> BrowserInstance ──new_isolated_page──> PageDriver
//! ```
//!
//! Backends report protocol failures as [`HarnessError::Browser`]; timeouts,
//! missing elements and assertion failures are decided by the harness layers
//! above, not by the backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BrowserProfile;
use crate::error::HarnessResult;

#[cfg(feature = "cdp")]
pub mod cdp;
pub mod fake;

/// Observable state of the first element matching a selector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    /// Rendered with a non-zero box and not hidden by style
    pub visible: bool,

    /// Not disabled
    pub enabled: bool,

    /// Rendered text
    pub text: String,

    pub html: String,
}

impl ElementState {
    pub fn interactable(&self) -> bool {
        self.visible && self.enabled
    }
}

/// A cookie as seen by the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
}

impl BrowserCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
        }
    }
}

/// Starts browser processes
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser with the given profile. Failures surface as
    /// [`HarnessError::Launch`](crate::error::HarnessError::Launch).
    async fn launch(&self, profile: &BrowserProfile) -> HarnessResult<Box<dyn BrowserInstance>>;
}

/// A running browser process
#[async_trait]
pub trait BrowserInstance: Send {
    /// Open a page inside a new cookie-and-storage-isolated context.
    async fn new_isolated_page(&mut self) -> HarnessResult<Box<dyn PageDriver>>;

    /// Close the browser and every context it owns.
    async fn close(&mut self) -> HarnessResult<()>;
}

/// Low-level page control. Every call is a single round trip; the harness
/// adds polling and bounds on top.
#[async_trait]
pub trait PageDriver: Send {
    /// Start a navigation and return once the page reports loaded.
    async fn goto(&mut self, url: &str) -> HarnessResult<()>;

    async fn wait_for_navigation(&mut self) -> HarnessResult<()>;

    /// State of the first match, `None` when nothing matches.
    async fn element_state(&mut self, selector: &str) -> HarnessResult<Option<ElementState>>;

    async fn click(&mut self, selector: &str) -> HarnessResult<()>;

    /// Reset the value of an input field.
    async fn clear(&mut self, selector: &str) -> HarnessResult<()>;

    async fn type_text(&mut self, selector: &str, text: &str) -> HarnessResult<()>;

    /// Submit the form matching the selector, or the form containing it.
    async fn submit_form(&mut self, selector: &str) -> HarnessResult<()>;

    /// Press a key on the focused element.
    async fn press_key(&mut self, key: &str) -> HarnessResult<()>;

    async fn cookies(&mut self) -> HarnessResult<Vec<BrowserCookie>>;

    async fn url(&mut self) -> HarnessResult<String>;

    async fn title(&mut self) -> HarnessResult<String>;

    async fn body_text(&mut self) -> HarnessResult<String>;

    /// PNG bytes of the whole page.
    async fn screenshot(&mut self) -> HarnessResult<Vec<u8>>;
}

/// JavaScript that reports [`ElementState`] for a selector as a JSON string,
/// or the string `null` when nothing matches.
pub(crate) fn element_state_script(selector: &str) -> String {
    let quoted = serde_json::Value::String(selector.to_string()).to_string();
    format!(
        r#"(() => {{
  const el = document.querySelector({quoted});
  if (!el) return "null";
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  const visible = style.display !== 'none' && style.visibility !== 'hidden'
    && rect.width > 0 && rect.height > 0;
  return JSON.stringify({{
    visible,
    enabled: !el.disabled,
    text: (el.innerText ?? el.textContent ?? '').toString(),
    html: el.innerHTML
  }});
}})()"#
    )
}

/// Parse the output of [`element_state_script`].
pub(crate) fn parse_element_state(raw: &str) -> HarnessResult<Option<ElementState>> {
    Ok(serde_json::from_str(raw)?)
}
