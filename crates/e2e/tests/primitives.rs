//! Session lifecycle, navigation, assertion and diagnostics primitives
//! against the in-memory browser.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use test_case::test_case;
use tokio::time::Instant;

use authflow_e2e::browser::fake::{FakeBrowser, FakeElement, FakeScreen, FakeSite};
use authflow_e2e::{
    Asserter, HarnessConfig, HarnessError, Logger, Navigator, ScenarioContext, SessionLifecycle,
    TypeOptions, WaitState,
};

const LOGIN: &str = "https://localhost:8443/cas/login";
const DONE: &str = "https://localhost:8443/cas/login?execution=done";

fn site() -> FakeSite {
    FakeSite::new()
        .screen(
            LOGIN,
            FakeScreen::new("CAS - Central Authentication Service")
                .element("#username", FakeElement::input())
                .element("#password", FakeElement::input())
                .element("#hidden", FakeElement::hidden())
                .element("#submit", FakeElement::visible("LOGIN").disabled())
                .element("#content p", FakeElement::visible("Enter your Username and Password"))
                .element(
                    "#late",
                    FakeElement::visible("late").appearing_after(Duration::from_millis(1500)),
                ),
        )
        .screen(
            DONE,
            FakeScreen::new("CAS - Log In Successful")
                .element("#content div h2", FakeElement::visible("  Log In Successful  "))
                .sets_cookie("TGC", "TGT-1-abc"),
        )
        .screen("https://slow.example.org/", FakeScreen::new("Slow").loading_for(Duration::from_secs(60)))
}

fn config(dir: &TempDir) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.artifacts_dir = dir.path().to_path_buf();
    config
}

async fn open(browser: &FakeBrowser, dir: &TempDir) -> (SessionLifecycle, ScenarioContext) {
    let lifecycle = SessionLifecycle::new(Arc::new(browser.clone()));
    let mut ctx = lifecycle.acquire("primitives", &config(dir)).await.unwrap();
    ctx.goto(LOGIN).await.unwrap();
    (lifecycle, ctx)
}

#[tokio::test(start_paused = true)]
async fn test_wait_is_bounded() {
    let dir = TempDir::new().unwrap();
    let browser = FakeBrowser::new(site());
    let (lifecycle, mut ctx) = open(&browser, &dir).await;

    let start = Instant::now();
    let result = ctx
        .wait_for_element("#never", WaitState::Attached, Some(Duration::from_secs(5)))
        .await;
    let elapsed = start.elapsed();

    match result {
        Err(HarnessError::WaitTimeout { selector, timeout_ms }) => {
            assert_eq!(selector, "#never");
            assert_eq!(timeout_ms, 5000);
        }
        other => panic!("expected wait timeout, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(6));

    lifecycle.release(ctx).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wait_sees_late_element() {
    let dir = TempDir::new().unwrap();
    let browser = FakeBrowser::new(site());
    let (lifecycle, mut ctx) = open(&browser, &dir).await;

    ctx.wait_for_element("#late", WaitState::Visible, None)
        .await
        .unwrap();
    ctx.wait_for_element("#hidden", WaitState::Hidden, Some(Duration::from_millis(10)))
        .await
        .unwrap();
    ctx.wait_for_element("#gone", WaitState::Detached, Some(Duration::from_millis(10)))
        .await
        .unwrap();

    lifecycle.release(ctx).await.unwrap();
}

#[derive(Debug, Clone, Copy)]
enum Interaction {
    Click,
    Type,
    Submit,
}

#[test_case(Interaction::Click, "#missing", None ; "click missing element")]
#[test_case(Interaction::Click, "#hidden", Some("hidden") ; "click hidden element")]
#[test_case(Interaction::Click, "#submit", Some("disabled") ; "click disabled element")]
#[test_case(Interaction::Type, "#missing", None ; "type into missing element")]
#[test_case(Interaction::Type, "#hidden", Some("hidden") ; "type into hidden element")]
#[test_case(Interaction::Type, "#submit", Some("disabled") ; "type into disabled element")]
#[test_case(Interaction::Submit, "#missing", None ; "submit missing form")]
#[test_case(Interaction::Submit, "#hidden", Some("hidden") ; "submit hidden form")]
#[test_case(Interaction::Submit, "#submit", Some("disabled") ; "submit disabled form")]
#[tokio::test(start_paused = true)]
async fn test_interactions_classify_failures(
    interaction: Interaction,
    selector: &str,
    reason: Option<&str>,
) {
    let dir = TempDir::new().unwrap();
    let browser = FakeBrowser::new(site());
    let (lifecycle, mut ctx) = open(&browser, &dir).await;

    let err = match interaction {
        Interaction::Click => ctx.click(selector).await,
        Interaction::Type => ctx.type_text(selector, "casuser", TypeOptions::default()).await,
        Interaction::Submit => ctx.submit_form(selector).await,
    }
    .unwrap_err();
    match (err, reason) {
        (HarnessError::ElementNotFound { selector: s }, None) => assert_eq!(s, selector),
        (HarnessError::ElementNotInteractable { reason: r, .. }, Some(expected)) => {
            assert_eq!(r, expected)
        }
        (other, _) => panic!("unexpected error {:?}", other),
    }

    lifecycle.release(ctx).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_navigation_timeout() {
    let dir = TempDir::new().unwrap();
    let browser = FakeBrowser::new(site());
    let lifecycle = SessionLifecycle::new(Arc::new(browser.clone()));
    let mut config = config(&dir);
    config.browser.navigation_timeout_ms = 1000;
    let mut ctx = lifecycle.acquire("slow", &config).await.unwrap();

    let err = ctx.goto("https://slow.example.org/").await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::NavigationTimeout { timeout_ms: 1000, .. }
    ));

    // No transition has fired, so nothing navigates
    let err = ctx
        .wait_for_navigation(Some(Duration::from_millis(250)))
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::NavigationTimeout { .. }));

    lifecycle.release(ctx).await.unwrap();
}

#[tokio::test]
async fn test_text_assertions_carry_page_context() {
    let dir = TempDir::new().unwrap();
    let browser = FakeBrowser::new(site());
    let (lifecycle, mut ctx) = open(&browser, &dir).await;

    ctx.assert_inner_text_contains("#content p", "Username")
        .await
        .unwrap();

    match ctx.assert_inner_text_contains("#content p", "status page").await {
        Err(HarnessError::AssertionFailure { message, url, title }) => {
            assert!(message.contains("Enter your Username"));
            assert_eq!(url, LOGIN);
            assert_eq!(title, "CAS - Central Authentication Service");
        }
        other => panic!("expected assertion failure, got {:?}", other),
    }

    assert!(matches!(
        ctx.assert_visibility("#hidden").await,
        Err(HarnessError::AssertionFailure { .. })
    ));

    ctx.goto(DONE).await.unwrap();
    ctx.assert_inner_text_equals("#content div h2", "Log In Successful")
        .await
        .unwrap();
    assert_eq!(ctx.inner_text("#content div h2").await.unwrap(), "Log In Successful");

    lifecycle.release(ctx).await.unwrap();
}

#[tokio::test]
async fn test_ticket_granting_cookie() {
    let dir = TempDir::new().unwrap();
    let browser = FakeBrowser::new(site());
    let (lifecycle, mut ctx) = open(&browser, &dir).await;

    match ctx.assert_ticket_granting_cookie().await {
        Err(HarnessError::SessionCookieMissing { cookie, url }) => {
            assert_eq!(cookie, "TGC");
            assert_eq!(url, LOGIN);
        }
        other => panic!("expected missing cookie, got {:?}", other),
    }
    ctx.assert_no_ticket_granting_cookie().await.unwrap();

    ctx.goto(DONE).await.unwrap();
    let cookie = ctx.assert_ticket_granting_cookie().await.unwrap();
    assert_eq!(cookie.value, "TGT-1-abc");
    assert!(ctx.assert_no_ticket_granting_cookie().await.is_err());

    lifecycle.release(ctx).await.unwrap();
}

#[tokio::test]
async fn test_contexts_do_not_share_cookies() {
    let dir = TempDir::new().unwrap();
    let browser = FakeBrowser::new(site());
    let lifecycle = SessionLifecycle::new(Arc::new(browser.clone()));

    let mut first = lifecycle.acquire("first", &config(&dir)).await.unwrap();
    first.goto(DONE).await.unwrap();
    first.assert_ticket_granting_cookie().await.unwrap();

    let mut second = lifecycle.acquire("second", &config(&dir)).await.unwrap();
    second.goto(LOGIN).await.unwrap();
    second.assert_no_ticket_granting_cookie().await.unwrap();

    lifecycle.release(first).await.unwrap();
    lifecycle.release(second).await.unwrap();
    assert_eq!(browser.stats().open_browsers(), 0);
}

#[tokio::test]
async fn test_type_clears_and_obfuscates() {
    let dir = TempDir::new().unwrap();
    let browser = FakeBrowser::new(site());
    let (lifecycle, mut ctx) = open(&browser, &dir).await;

    ctx.type_text("#username", "old", TypeOptions::default())
        .await
        .unwrap();
    ctx.type_text("#username", "casuser", TypeOptions::cleared())
        .await
        .unwrap();
    ctx.type_text("#password", "Mellon", TypeOptions::secret())
        .await
        .unwrap();
    ctx.press_key("Enter").await.unwrap();

    assert_eq!(browser.stats().keys, vec!["Enter".to_string()]);
    lifecycle.release(ctx).await.unwrap();
}

#[tokio::test]
async fn test_screenshots_are_numbered_and_hashed() {
    let dir = TempDir::new().unwrap();
    let browser = FakeBrowser::new(site());
    let (lifecycle, mut ctx) = open(&browser, &dir).await;

    let first = ctx.screenshot().await.unwrap();
    let second = ctx.screenshot().await.unwrap();
    assert!(first.ends_with("screenshots/primitives-001.png"));
    assert!(second.ends_with("screenshots/primitives-002.png"));
    assert!(first.starts_with(dir.path().join("primitives")));

    let snapshot = ctx.log_page().await;
    assert_eq!(snapshot.url, LOGIN);
    assert!(dir.path().join("primitives/pages.jsonl").exists());

    let artifacts = ctx.take_artifacts();
    assert_eq!(artifacts.len(), 2);
    assert_eq!(artifacts[0].sha256.len(), 64);

    lifecycle.release(ctx).await.unwrap();
}

#[tokio::test]
async fn test_screenshot_failure_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let browser = FakeBrowser::new(site().failing_screenshots());
    let (lifecycle, mut ctx) = open(&browser, &dir).await;

    assert!(ctx.screenshot().await.is_none());
    assert!(ctx.artifacts().is_empty());
    ctx.assert_visibility("#username").await.unwrap();

    lifecycle.release(ctx).await.unwrap();
}

#[tokio::test]
async fn test_launch_failure_leaves_nothing_to_release() {
    let dir = TempDir::new().unwrap();
    let browser = FakeBrowser::new(site().failing_launch("chromium not found"));
    let lifecycle = SessionLifecycle::new(Arc::new(browser.clone()));

    let result = lifecycle.acquire("launch", &config(&dir)).await;
    assert!(matches!(result, Err(HarnessError::Launch(_))));

    let stats = browser.stats();
    assert_eq!(stats.launches, 0);
    assert_eq!(stats.closes, 0);
}
