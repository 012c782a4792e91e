//! Chromium backend over the DevTools protocol

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    element_state_script, parse_element_state, BrowserCookie, BrowserInstance, BrowserLauncher,
    ElementState, PageDriver,
};
use crate::config::BrowserProfile;
use crate::error::{HarnessError, HarnessResult};

fn browser_err(e: impl std::fmt::Display) -> HarnessError {
    HarnessError::Browser(e.to_string())
}

/// Launches local Chromium processes
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher;

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self
    }

    fn build_config(profile: &BrowserProfile) -> HarnessResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(profile.viewport_width, profile.viewport_height)
            .request_timeout(profile.navigation_timeout());

        if !profile.headless {
            builder = builder.with_head();
        }
        if profile.no_sandbox {
            builder = builder.no_sandbox();
        }
        if profile.ignore_certificate_errors {
            builder = builder.arg("--ignore-certificate-errors");
        }
        if let Some(ref path) = profile.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &profile.extra_args {
            builder = builder.arg(arg.as_str());
        }

        builder.build().map_err(HarnessError::Launch)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, profile: &BrowserProfile) -> HarnessResult<Box<dyn BrowserInstance>> {
        let config = Self::build_config(profile)?;

        info!(
            "Launching Chromium (headless: {}, viewport: {}x{})",
            profile.headless, profile.viewport_width, profile.viewport_height
        );

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarnessError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("CDP handler event loop ended");
                    break;
                }
            }
        });

        Ok(Box::new(ChromiumInstance {
            browser,
            handler_task,
            contexts: Vec::new(),
        }))
    }
}

struct ChromiumInstance {
    browser: Browser,
    handler_task: JoinHandle<()>,
    contexts: Vec<BrowserContextId>,
}

#[async_trait]
impl BrowserInstance for ChromiumInstance {
    async fn new_isolated_page(&mut self) -> HarnessResult<Box<dyn PageDriver>> {
        let context_id = self
            .browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(browser_err)?;

        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(HarnessError::Browser)?;

        let page = self.browser.new_page(params).await.map_err(browser_err)?;
        self.contexts.push(context_id);

        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&mut self) -> HarnessResult<()> {
        debug!("Closing Chromium ({} context(s))", self.contexts.len());
        let closed = self.browser.close().await.map_err(browser_err);
        if let Err(e) = self.browser.wait().await {
            warn!("Error waiting for Chromium to exit: {}", e);
        }
        self.handler_task.abort();
        closed.map(|_| ())
    }
}

struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn eval_string(&self, script: String) -> HarnessResult<String> {
        self.page
            .evaluate(script)
            .await
            .map_err(browser_err)?
            .into_value::<String>()
            .map_err(HarnessError::from)
    }

    async fn eval_bool(&self, script: String) -> HarnessResult<bool> {
        self.page
            .evaluate(script)
            .await
            .map_err(browser_err)?
            .into_value::<bool>()
            .map_err(HarnessError::from)
    }
}

fn quoted(selector: &str) -> String {
    serde_json::Value::String(selector.to_string()).to_string()
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&mut self, url: &str) -> HarnessResult<()> {
        self.page.goto(url).await.map_err(browser_err)?;
        Ok(())
    }

    async fn wait_for_navigation(&mut self) -> HarnessResult<()> {
        self.page.wait_for_navigation().await.map_err(browser_err)?;
        Ok(())
    }

    async fn element_state(&mut self, selector: &str) -> HarnessResult<Option<ElementState>> {
        let raw = self.eval_string(element_state_script(selector)).await?;
        parse_element_state(&raw)
    }

    async fn click(&mut self, selector: &str) -> HarnessResult<()> {
        let element = self.page.find_element(selector).await.map_err(browser_err)?;
        element.click().await.map_err(browser_err)?;
        Ok(())
    }

    async fn clear(&mut self, selector: &str) -> HarnessResult<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.value = ''; return true; }})()",
            quoted(selector)
        );
        if !self.eval_bool(script).await? {
            return Err(HarnessError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        Ok(())
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> HarnessResult<()> {
        let element = self.page.find_element(selector).await.map_err(browser_err)?;
        element.click().await.map_err(browser_err)?;
        element.type_str(text).await.map_err(browser_err)?;
        Ok(())
    }

    async fn submit_form(&mut self, selector: &str) -> HarnessResult<()> {
        let script = format!(
            r#"(() => {{
  const el = document.querySelector({});
  if (!el) return false;
  const form = el.tagName === 'FORM' ? el : el.closest('form');
  if (!form) return false;
  if (form.requestSubmit) {{ form.requestSubmit(); }} else {{ form.submit(); }}
  return true;
}})()"#,
            quoted(selector)
        );
        if !self.eval_bool(script).await? {
            return Err(HarnessError::ElementNotInteractable {
                selector: selector.to_string(),
                reason: "no form to submit".to_string(),
            });
        }
        Ok(())
    }

    async fn press_key(&mut self, key: &str) -> HarnessResult<()> {
        let target = match self.page.find_element(":focus").await {
            Ok(element) => element,
            Err(_) => self.page.find_element("body").await.map_err(browser_err)?,
        };
        target.press_key(key).await.map_err(browser_err)?;
        Ok(())
    }

    async fn cookies(&mut self) -> HarnessResult<Vec<BrowserCookie>> {
        let cookies = self.page.get_cookies().await.map_err(browser_err)?;
        Ok(cookies
            .into_iter()
            .map(|c| BrowserCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
            })
            .collect())
    }

    async fn url(&mut self) -> HarnessResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(browser_err)?
            .unwrap_or_default())
    }

    async fn title(&mut self) -> HarnessResult<String> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(browser_err)?
            .unwrap_or_default())
    }

    async fn body_text(&mut self) -> HarnessResult<String> {
        self.eval_string("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn screenshot(&mut self) -> HarnessResult<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(browser_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_accepts_profile() {
        let profile = BrowserProfile {
            headless: false,
            no_sandbox: true,
            extra_args: vec!["--start-maximized".to_string()],
            chrome_executable: Some("/usr/bin/chromium".into()),
            ..Default::default()
        };
        // An explicit executable skips detection; no process is started.
        assert!(ChromiumLauncher::build_config(&profile).is_ok());
    }
}
