//! Authentication flow scenario harness
//!
//! This crate drives a headless browser through multi-step web
//! authentication flows and checks both what the user sees and what the
//! server recorded:
//! - Launches an isolated browser per scenario and always closes it
//! - Navigates, types and submits forms with bounded waits
//! - Asserts on page content and on the ticket-granting session cookie
//! - Probes management endpoints for server-side state
//! - Captures numbered screenshots and page logs for post-mortem debugging
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ScenarioRunner                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SessionLifecycle                                           │
//! │    ├── acquire(id, config) -> ScenarioContext               │
//! │    └── release(ctx)                                         │
//! │  ScenarioContext                                            │
//! │    ├── Navigator   goto, click, type, wait_for_*            │
//! │    ├── Asserter    visibility, inner text, TGC cookie       │
//! │    └── Logger      screenshot, log_page                     │
//! │  LoginFlowHelper   login_with, submit_token                 │
//! │  HttpProbe         do_request, get_json                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── name, description, tags, browser overrides           │
//! │    └── steps: [Step]                                        │
//! │          ├── navigate / click / type / submit_form / press  │
//! │          ├── wait / wait_for_navigation / sleep             │
//! │          ├── login / submit_token                           │
//! │          ├── assert_* / screenshot / log_page / log_json    │
//! │          └── probe / probe_trusted_devices                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserLauncher -> BrowserInstance -> PageDriver           │
//! │    ├── cdp::ChromiumLauncher  (DevTools protocol)           │
//! │    └── fake::FakeBrowser      (in-memory, for tests)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertions;
pub mod browser;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod login;
pub mod navigation;
pub mod probe;
pub mod readiness;
pub mod records;
pub mod runner;
pub mod scenario;
pub mod session;

pub use assertions::Asserter;
pub use config::{BrowserProfile, HarnessConfig, Variables};
pub use diagnostics::Logger;
pub use error::{HarnessError, HarnessResult};
pub use login::LoginFlowHelper;
pub use navigation::{Navigator, TypeOptions, WaitState};
pub use probe::{HttpProbe, Prober};
pub use records::{AuthenticationResult, Credential, LoginOutcome, TrustedDeviceRecord};
pub use runner::{ScenarioReport, ScenarioRunner};
pub use scenario::{Scenario, Step};
pub use session::{ScenarioContext, SessionLifecycle};
