//! authflow-e2e - run one authentication scenario
//!
//! Exit status: 0 when the scenario passes, 1 on a test failure, 2 when the
//! run could not start (configuration, scenario parse, browser launch).

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use authflow_e2e::browser::BrowserLauncher;
use authflow_e2e::readiness::wait_until_ready;
use authflow_e2e::{HarnessConfig, HarnessResult, Scenario, ScenarioRunner, Variables};

const EXIT_SETUP: i32 = 2;

/// Drive a headless browser through an authentication scenario
#[derive(Parser)]
#[command(name = "authflow-e2e")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario name, directory or YAML file
    scenario: String,

    /// Directory searched when the scenario is given by name
    #[arg(long, env = "AUTHFLOW_SCENARIOS_DIR", default_value = "scenarios")]
    scenarios_dir: PathBuf,

    /// Harness configuration file (TOML)
    #[arg(long, env = "AUTHFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Where screenshots, page logs and the report are written
    #[arg(long, env = "AUTHFLOW_ARTIFACTS_DIR")]
    artifacts: Option<PathBuf>,

    /// Run the browser headless
    #[arg(long, env = "AUTHFLOW_HEADLESS")]
    headless: Option<bool>,

    /// Chrome/Chromium executable
    #[arg(long, env = "AUTHFLOW_CHROME")]
    chrome: Option<PathBuf>,

    /// Launch Chromium with --no-sandbox
    #[arg(long)]
    no_sandbox: bool,

    #[arg(long)]
    navigation_timeout_ms: Option<u64>,

    #[arg(long)]
    wait_timeout_ms: Option<u64>,

    /// Scenario variable, NAME=VALUE (repeatable; overrides the environment)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// Wait for this URL to answer 2xx before starting
    #[arg(long)]
    wait_for: Option<String>,

    #[arg(long, default_value = "120")]
    wait_for_timeout_secs: u64,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_logging(args: &Args) {
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

fn load_config(args: &Args) -> HarnessResult<HarnessConfig> {
    let mut config = match args.config {
        Some(ref path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::default(),
    };

    if let Some(ref dir) = args.artifacts {
        config.artifacts_dir = dir.clone();
    }
    if let Some(headless) = args.headless {
        config.browser.headless = headless;
    }
    if let Some(ref chrome) = args.chrome {
        config.browser.chrome_executable = Some(chrome.clone());
    }
    if args.no_sandbox {
        config.browser.no_sandbox = true;
    }
    if let Some(ms) = args.navigation_timeout_ms {
        config.browser.navigation_timeout_ms = ms;
    }
    if let Some(ms) = args.wait_timeout_ms {
        config.browser.wait_timeout_ms = ms;
    }
    Ok(config)
}

fn load_variables(args: &Args) -> HarnessResult<Variables> {
    let mut vars = Variables::from_env();
    for raw in &args.vars {
        let (name, value) = Variables::parse_assignment(raw)?;
        vars.insert(name, value);
    }
    Ok(vars)
}

#[cfg(feature = "cdp")]
fn launcher() -> HarnessResult<Arc<dyn BrowserLauncher>> {
    Ok(Arc::new(authflow_e2e::browser::cdp::ChromiumLauncher::new()))
}

#[cfg(not(feature = "cdp"))]
fn launcher() -> HarnessResult<Arc<dyn BrowserLauncher>> {
    Err(authflow_e2e::HarnessError::Launch(
        "built without a browser backend (enable the `cdp` feature)".to_string(),
    ))
}

async fn run(args: Args) -> HarnessResult<i32> {
    let config = load_config(&args)?;
    let variables = load_variables(&args)?;
    let scenario = Scenario::resolve(&args.scenario, &args.scenarios_dir)?;

    if let Some(ref url) = args.wait_for {
        let ready = wait_until_ready(
            url,
            Duration::from_secs(args.wait_for_timeout_secs),
            Duration::from_secs(1),
            config.probe.accept_invalid_certs,
        )
        .await;
        if let Err(e) = ready {
            error!("System under test not ready: {}", e);
            return Ok(EXIT_SETUP);
        }
    }

    let artifacts_dir = config.artifacts_dir.clone();
    let runner = ScenarioRunner::new(config, variables, launcher()?)?;
    let report = runner.run(&scenario).await;
    report.persist(&artifacts_dir);

    if let Some(ref failure) = report.failure {
        error!("{} failed ({}): {}", report.name, failure.kind, failure.message);
    } else {
        info!("{} passed in {} ms", report.name, report.duration_ms);
    }
    Ok(report.exit_code())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args);

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            if e.is_setup() {
                EXIT_SETUP
            } else {
                1
            }
        }
    };
    process::exit(code);
}
