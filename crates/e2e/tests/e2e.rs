//! E2E test harness entry point
//!
//! This file is the test binary that runs the calculator scenarios in a real
//! browser. Point it at a running app or let it start one:
//!
//!   CALC_E2E_BASE_URL=http://127.0.0.1:8000 cargo test -p calc-e2e --test e2e
//!   cargo test -p calc-e2e --test e2e -- --server-cmd 'uvicorn main:app --port {port}'
//!
//! Without either, the run is skipped.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use calc_e2e::playwright::{Browser, PlaywrightConfig, PlaywrightDriver};
use calc_e2e::runner::{RunnerConfig, ScenarioRunner};
use calc_e2e::server::{ServerConfig, ServerHandle};
use calc_e2e::{catalog, E2eError, E2eResult, Scenario, Timeouts};

#[derive(Parser, Debug)]
#[command(name = "calc-e2e")]
#[command(about = "Browser workflow checks for the calculator app")]
#[command(ignore_errors = true)]
struct Args {
    /// Root URL of an already running app
    #[arg(long, env = "CALC_E2E_BASE_URL")]
    base_url: Option<String>,

    /// Shell command that starts the app; `{host}` and `{port}` are substituted
    #[arg(long, env = "CALC_E2E_SERVER_CMD")]
    server_cmd: Option<String>,

    /// Directory of extra YAML scenarios
    #[arg(long)]
    scenarios: Option<PathBuf>,

    /// Run only scenarios matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    name: Option<String>,

    /// Scenarios running at once
    #[arg(long, default_value = "4")]
    parallel: usize,

    /// Master seed for identity generation
    #[arg(long, env = "CALC_E2E_SEED")]
    seed: Option<u64>,

    /// Browser to use
    #[arg(long, value_enum, default_value = "chromium")]
    browser: Browser,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if args.base_url.is_none() && args.server_cmd.is_none() {
        eprintln!("Skipping: set CALC_E2E_BASE_URL or pass --server-cmd to run browser scenarios");
        std::process::exit(0);
    }

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let result = rt.block_on(async_main(args));

    match result {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(E2eError::PlaywrightNotFound) => {
            eprintln!("Skipping: {}", E2eError::PlaywrightNotFound);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

fn select_scenarios(args: &Args) -> E2eResult<Vec<Scenario>> {
    let mut scenarios = catalog::builtin();
    if let Some(dir) = &args.scenarios {
        scenarios.extend(Scenario::load_all(dir)?);
    }

    if let Some(tag) = &args.tag {
        scenarios.retain(|s| s.tags.iter().any(|t| t == tag));
    }
    if let Some(name) = &args.name {
        scenarios.retain(|s| &s.name == name);
        if scenarios.is_empty() {
            return Err(E2eError::ScenarioParse(format!("Scenario not found: {}", name)));
        }
    }
    Ok(scenarios)
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let scenarios = select_scenarios(&args)?;

    // Start server unless one is already running
    let server = match (&args.base_url, &args.server_cmd) {
        (None, Some(command)) => Some(ServerHandle::spawn(ServerConfig::new(command.clone())).await?),
        _ => None,
    };
    let base_url = match (&server, &args.base_url) {
        (Some(server), _) => server.base_url().to_string(),
        (None, Some(url)) => url.trim_end_matches('/').to_string(),
        (None, None) => unreachable!("checked before starting the runtime"),
    };

    let driver = PlaywrightDriver::launch(PlaywrightConfig {
        browser: args.browser,
        headless: !args.headed,
        ..Default::default()
    })
    .await?;

    let runner = ScenarioRunner::new(
        driver,
        RunnerConfig {
            base_url,
            timeouts: Timeouts::default(),
            parallelism: args.parallel,
            seed: args.seed,
            output_dir: args.output,
        },
    );

    let results = runner.run_all(&scenarios).await;
    runner.write_results(&results)?;

    for failure in results.failures() {
        warn!(
            "{} failed (seed {}, user {}): {}",
            failure.name,
            failure.seed,
            failure.username.as_deref().unwrap_or("-"),
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    info!("Replay identities with --seed {}", results.seed);

    if let Err(e) = runner.factory().shutdown().await {
        warn!("Playwright bridge shutdown: {}", e);
    }
    drop(server);

    Ok(results.success())
}
