//! Assertion primitives
//!
//! Read-only checks over the current page. Each either returns normally or
//! fails with a typed error that carries the page URL and title.

use async_trait::async_trait;
use tracing::info;

use crate::browser::{BrowserCookie, ElementState};
use crate::error::{HarnessError, HarnessResult};
use crate::session::ScenarioContext;

const TEXT_SNAPSHOT_CHARS: usize = 300;

/// Verifies page state
#[async_trait]
pub trait Asserter: Send {
    async fn assert_visibility(&mut self, selector: &str) -> HarnessResult<()>;

    /// Case-sensitive literal substring match on the element's text.
    async fn assert_inner_text_contains(
        &mut self,
        selector: &str,
        expected: &str,
    ) -> HarnessResult<()>;

    /// Exact match on the element's trimmed text.
    async fn assert_inner_text_equals(&mut self, selector: &str, expected: &str)
        -> HarnessResult<()>;

    /// Trimmed text of the element.
    async fn inner_text(&mut self, selector: &str) -> HarnessResult<String>;

    async fn inner_html(&mut self, selector: &str) -> HarnessResult<String>;

    /// Passes iff the ticket-granting cookie is in the context's jar.
    async fn assert_ticket_granting_cookie(&mut self) -> HarnessResult<BrowserCookie>;

    async fn assert_no_ticket_granting_cookie(&mut self) -> HarnessResult<()>;

    /// Cookie lookup that never fails on absence.
    async fn find_cookie(&mut self, name: &str) -> HarnessResult<Option<BrowserCookie>>;
}

/// First `max` characters of `text`, on a char boundary.
pub(crate) fn excerpt(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

impl ScenarioContext {
    /// Assertion failure carrying the current URL and title.
    pub(crate) async fn failure(&mut self, message: String) -> HarnessError {
        let url = self.page().url().await.unwrap_or_default();
        let title = self.page().title().await.unwrap_or_default();
        HarnessError::AssertionFailure {
            message,
            url,
            title,
        }
    }

    async fn existing(&mut self, selector: &str) -> HarnessResult<ElementState> {
        let state = self.page().element_state(selector).await?;
        match state {
            Some(state) => Ok(state),
            None => Err(self
                .failure(format!("no element matches {}", selector))
                .await),
        }
    }
}

#[async_trait]
impl Asserter for ScenarioContext {
    async fn assert_visibility(&mut self, selector: &str) -> HarnessResult<()> {
        let state = self.page().element_state(selector).await?;
        if state.as_ref().map(|s| s.visible).unwrap_or(false) {
            info!("Element {} is visible", selector);
            return Ok(());
        }

        let body = self.page().body_text().await.unwrap_or_default();
        let what = if state.is_some() { "is not visible" } else { "does not exist" };
        Err(self
            .failure(format!(
                "element {} {}; page text: {}",
                selector,
                what,
                excerpt(&body, TEXT_SNAPSHOT_CHARS)
            ))
            .await)
    }

    async fn assert_inner_text_contains(
        &mut self,
        selector: &str,
        expected: &str,
    ) -> HarnessResult<()> {
        let state = self.existing(selector).await?;
        if state.text.contains(expected) {
            return Ok(());
        }
        Err(self
            .failure(format!(
                "text of {} does not contain '{}'; actual: '{}'",
                selector, expected, state.text
            ))
            .await)
    }

    async fn assert_inner_text_equals(
        &mut self,
        selector: &str,
        expected: &str,
    ) -> HarnessResult<()> {
        let state = self.existing(selector).await?;
        if state.text.trim() == expected {
            return Ok(());
        }
        Err(self
            .failure(format!(
                "text of {} is not '{}'; actual: '{}'",
                selector,
                expected,
                state.text.trim()
            ))
            .await)
    }

    async fn inner_text(&mut self, selector: &str) -> HarnessResult<String> {
        Ok(self.existing(selector).await?.text.trim().to_string())
    }

    async fn inner_html(&mut self, selector: &str) -> HarnessResult<String> {
        Ok(self.existing(selector).await?.html)
    }

    async fn assert_ticket_granting_cookie(&mut self) -> HarnessResult<BrowserCookie> {
        let name = self.config().ticket_granting_cookie.clone();
        let found = self.find_cookie(&name).await?;
        match found {
            Some(cookie) => {
                info!("Ticket-granting cookie {} is present", name);
                Ok(cookie)
            }
            None => Err(HarnessError::SessionCookieMissing {
                cookie: name,
                url: self.page().url().await.unwrap_or_default(),
            }),
        }
    }

    async fn assert_no_ticket_granting_cookie(&mut self) -> HarnessResult<()> {
        let name = self.config().ticket_granting_cookie.clone();
        let found = self.find_cookie(&name).await?;
        match found {
            None => Ok(()),
            Some(_) => Err(self
                .failure(format!("ticket-granting cookie {} is present", name))
                .await),
        }
    }

    async fn find_cookie(&mut self, name: &str) -> HarnessResult<Option<BrowserCookie>> {
        let cookies = self.page().cookies().await?;
        Ok(cookies
            .into_iter()
            .find(|c| c.name == name && !c.value.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_respects_char_boundary() {
        assert_eq!(excerpt("  short  ", 10), "short");
        assert_eq!(excerpt("héllo wörld", 5), "héllo...");
    }
}
