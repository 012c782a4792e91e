//! In-memory browser for exercising the harness without Chromium
//!
//! A [`FakeSite`] is a small scripted web: screens keyed by URL, elements
//! that may appear after a delay, and transitions fired by clicks, form
//! submissions and key presses. [`FakeBrowser`] launches instances over a
//! site and counts launches, pages and closes so tests can check that every
//! browser is released.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{BrowserCookie, BrowserInstance, BrowserLauncher, ElementState, PageDriver};
use crate::config::BrowserProfile;
use crate::error::{HarnessError, HarnessResult};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub visible: bool,
    pub enabled: bool,
    pub text: String,
    pub html: String,

    /// Element is absent until this long after its screen loaded
    pub appears_after: Option<Duration>,
}

impl FakeElement {
    pub fn visible(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            visible: true,
            enabled: true,
            html: text.clone(),
            text,
            appears_after: None,
        }
    }

    pub fn input() -> Self {
        Self::visible("")
    }

    pub fn hidden() -> Self {
        Self {
            visible: false,
            ..Self::visible("")
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn appearing_after(mut self, delay: Duration) -> Self {
        self.appears_after = Some(delay);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeScreen {
    pub title: String,
    pub elements: BTreeMap<String, FakeElement>,

    /// Cookies added to the jar when the screen loads
    pub set_cookies: Vec<BrowserCookie>,

    /// How long `goto` takes to report the screen as loaded
    pub load_delay: Option<Duration>,
}

impl FakeScreen {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn element(mut self, selector: impl Into<String>, element: FakeElement) -> Self {
        self.elements.insert(selector.into(), element);
        self
    }

    pub fn sets_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_cookies.push(BrowserCookie::new(name, value));
        self
    }

    pub fn loading_for(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Click(String),
    Submit(String),
    Key(String),
}

/// Moves the page from one URL to another when its trigger fires
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: String,
    pub trigger: Trigger,
    pub to: String,

    /// Field values (selector, exact typed text) that must be present
    pub requires: Vec<(String, String)>,
}

impl Transition {
    pub fn new(from: impl Into<String>, trigger: Trigger, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            trigger,
            to: to.into(),
            requires: Vec::new(),
        }
    }

    pub fn requires(mut self, selector: impl Into<String>, value: impl Into<String>) -> Self {
        self.requires.push((selector.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    screens: BTreeMap<String, FakeScreen>,
    transitions: Vec<Transition>,
    launch_failure: Option<String>,
    screenshot_failure: bool,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(mut self, url: impl Into<String>, screen: FakeScreen) -> Self {
        self.screens.insert(url.into(), screen);
        self
    }

    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn on_click(self, from: &str, selector: &str, to: &str) -> Self {
        self.transition(Transition::new(from, Trigger::Click(selector.to_string()), to))
    }

    pub fn on_submit(self, from: &str, selector: &str, to: &str) -> Self {
        self.transition(Transition::new(from, Trigger::Submit(selector.to_string()), to))
    }

    /// Make every launch fail with the given reason.
    pub fn failing_launch(mut self, reason: impl Into<String>) -> Self {
        self.launch_failure = Some(reason.into());
        self
    }

    pub fn failing_screenshots(mut self) -> Self {
        self.screenshot_failure = true;
        self
    }
}

/// Counters shared by every instance of one [`FakeBrowser`]
#[derive(Debug, Clone, Default)]
pub struct FakeStats {
    pub launches: usize,
    pub closes: usize,
    pub pages: usize,
    pub navigations: Vec<String>,
    pub keys: Vec<String>,
}

impl FakeStats {
    pub fn open_browsers(&self) -> usize {
        self.launches.saturating_sub(self.closes)
    }
}

/// Launcher over a [`FakeSite`]
#[derive(Debug, Clone)]
pub struct FakeBrowser {
    site: Arc<FakeSite>,
    stats: Arc<Mutex<FakeStats>>,
}

impl FakeBrowser {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            stats: Arc::new(Mutex::new(FakeStats::default())),
        }
    }

    pub fn stats(&self) -> FakeStats {
        self.stats.lock().clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(&self, _profile: &BrowserProfile) -> HarnessResult<Box<dyn BrowserInstance>> {
        if let Some(ref reason) = self.site.launch_failure {
            return Err(HarnessError::Launch(reason.clone()));
        }
        self.stats.lock().launches += 1;
        Ok(Box::new(FakeInstance {
            site: self.site.clone(),
            stats: self.stats.clone(),
            closed: false,
        }))
    }
}

struct FakeInstance {
    site: Arc<FakeSite>,
    stats: Arc<Mutex<FakeStats>>,
    closed: bool,
}

#[async_trait]
impl BrowserInstance for FakeInstance {
    async fn new_isolated_page(&mut self) -> HarnessResult<Box<dyn PageDriver>> {
        if self.closed {
            return Err(HarnessError::Browser("browser already closed".to_string()));
        }
        self.stats.lock().pages += 1;
        Ok(Box::new(FakePage {
            site: self.site.clone(),
            stats: self.stats.clone(),
            url: "about:blank".to_string(),
            loaded_at: Instant::now(),
            values: BTreeMap::new(),
            cookies: Vec::new(),
            navigated: false,
        }))
    }

    async fn close(&mut self) -> HarnessResult<()> {
        if !self.closed {
            self.closed = true;
            self.stats.lock().closes += 1;
        }
        Ok(())
    }
}

struct FakePage {
    site: Arc<FakeSite>,
    stats: Arc<Mutex<FakeStats>>,
    url: String,
    loaded_at: Instant,
    values: BTreeMap<String, String>,

    /// Jar of this page's isolated context
    cookies: Vec<BrowserCookie>,

    /// A transition fired since the last `wait_for_navigation`
    navigated: bool,
}

impl FakePage {
    fn current_screen(&self) -> Option<&FakeScreen> {
        self.site.screens.get(&self.url)
    }

    fn present(&self, selector: &str) -> Option<&FakeElement> {
        let element = self.current_screen()?.elements.get(selector)?;
        match element.appears_after {
            Some(delay) if self.loaded_at.elapsed() < delay => None,
            _ => Some(element),
        }
    }

    fn require_present(&self, selector: &str) -> HarnessResult<&FakeElement> {
        self.present(selector)
            .ok_or_else(|| HarnessError::Browser(format!("no node found for {}", selector)))
    }

    fn enter(&mut self, url: &str) {
        self.url = url.to_string();
        self.loaded_at = Instant::now();
        self.values.clear();
        if let Some(screen) = self.site.screens.get(url) {
            for cookie in &screen.set_cookies {
                self.cookies.retain(|c| c.name != cookie.name);
                self.cookies.push(cookie.clone());
            }
        }
        self.stats.lock().navigations.push(url.to_string());
    }

    fn fire(&mut self, trigger: Trigger) {
        let target = self
            .site
            .transitions
            .iter()
            .find(|t| {
                t.from == self.url
                    && t.trigger == trigger
                    && t.requires
                        .iter()
                        .all(|(sel, value)| self.values.get(sel) == Some(value))
            })
            .map(|t| t.to.clone());

        if let Some(to) = target {
            self.enter(&to);
            self.navigated = true;
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&mut self, url: &str) -> HarnessResult<()> {
        if let Some(delay) = self.site.screens.get(url).and_then(|s| s.load_delay) {
            tokio::time::sleep(delay).await;
        }
        self.enter(url);
        Ok(())
    }

    async fn wait_for_navigation(&mut self) -> HarnessResult<()> {
        if self.navigated {
            self.navigated = false;
            return Ok(());
        }
        // Nothing will ever navigate; the caller's bound decides.
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn element_state(&mut self, selector: &str) -> HarnessResult<Option<ElementState>> {
        Ok(self.present(selector).map(|e| ElementState {
            visible: e.visible,
            enabled: e.enabled,
            text: e.text.clone(),
            html: e.html.clone(),
        }))
    }

    async fn click(&mut self, selector: &str) -> HarnessResult<()> {
        self.require_present(selector)?;
        self.fire(Trigger::Click(selector.to_string()));
        Ok(())
    }

    async fn clear(&mut self, selector: &str) -> HarnessResult<()> {
        self.require_present(selector)?;
        self.values.insert(selector.to_string(), String::new());
        Ok(())
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> HarnessResult<()> {
        self.require_present(selector)?;
        self.values
            .entry(selector.to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn submit_form(&mut self, selector: &str) -> HarnessResult<()> {
        self.require_present(selector)?;
        self.fire(Trigger::Submit(selector.to_string()));
        Ok(())
    }

    async fn press_key(&mut self, key: &str) -> HarnessResult<()> {
        self.stats.lock().keys.push(key.to_string());
        self.fire(Trigger::Key(key.to_string()));
        Ok(())
    }

    async fn cookies(&mut self) -> HarnessResult<Vec<BrowserCookie>> {
        Ok(self.cookies.clone())
    }

    async fn url(&mut self) -> HarnessResult<String> {
        Ok(self.url.clone())
    }

    async fn title(&mut self) -> HarnessResult<String> {
        Ok(self
            .current_screen()
            .map(|s| s.title.clone())
            .unwrap_or_default())
    }

    async fn body_text(&mut self) -> HarnessResult<String> {
        let Some(screen) = self.current_screen() else {
            return Ok(String::new());
        };
        let texts: Vec<&str> = screen
            .elements
            .keys()
            .filter_map(|sel| self.present(sel))
            .filter(|e| e.visible && !e.text.is_empty())
            .map(|e| e.text.as_str())
            .collect();
        Ok(texts.join("\n"))
    }

    async fn screenshot(&mut self) -> HarnessResult<Vec<u8>> {
        if self.site.screenshot_failure {
            return Err(HarnessError::Browser("screenshot capture failed".to_string()));
        }
        let mut png = PNG_MAGIC.to_vec();
        png.extend_from_slice(self.url.as_bytes());
        Ok(png)
    }
}
