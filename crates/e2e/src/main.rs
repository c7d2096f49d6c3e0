//! `hms-e2e`: run the HMS browser suite against one environment

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hms_e2e::appointment::{AppointmentBooker, StaticBooker};
use hms_e2e::config::ENV_SELECTOR_VAR;
use hms_e2e::engine::BrowserEngine;
use hms_e2e::error::exit_code;
use hms_e2e::playwright::{Browser, PlaywrightConfig, PlaywrightEngine};
use hms_e2e::preflight::{wait_for_app, PreflightConfig};
use hms_e2e::{builtin_scenarios, RecordingEngine, RunnerConfig, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "hms-e2e")]
#[command(about = "Data-driven E2E suite for the HMS patient-management app")]
struct Args {
    /// Environment key in the global configuration
    #[arg(short, long, env = ENV_SELECTOR_VAR, default_value = "local")]
    env: String,

    /// Global configuration file
    #[arg(long, default_value = "config/global.json")]
    config: PathBuf,

    /// Test plan file
    #[arg(long, default_value = "test-plans/hms.json")]
    plan: PathBuf,

    /// Fixture datasets directory
    #[arg(long, default_value = "fixtures")]
    fixtures: PathBuf,

    /// Locator YAML directory
    #[arg(long, default_value = "locators")]
    locators: PathBuf,

    /// Run only this spec file (requires --test-name)
    #[arg(long, requires = "test_name")]
    spec_file: Option<String>,

    /// Run only this test group (requires --spec-file)
    #[arg(long, requires = "spec_file")]
    test_name: Option<String>,

    /// Record the action sequence instead of driving a browser
    #[arg(long)]
    dry_run: bool,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    browser: String,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Viewport width
    #[arg(long, default_value = "1280")]
    viewport_width: u32,

    /// Viewport height
    #[arg(long, default_value = "720")]
    viewport_height: u32,

    /// Skip waiting for the application before the run
    #[arg(long)]
    skip_preflight: bool,

    /// Output directory for results and screenshots
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let result = tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")
        .and_then(|rt| rt.block_on(async_main(args)));

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }
    std::process::exit(exit_code(&result));
}

async fn async_main(args: Args) -> anyhow::Result<bool> {
    let config = RunnerConfig {
        config_path: args.config,
        environment: args.env,
        plan_path: args.plan,
        fixtures_dir: args.fixtures,
        locators_dir: args.locators,
        screenshot_dir: args.output.join("screenshots"),
        output_dir: args.output,
        dry_run: args.dry_run,
    };

    let (engine, booker): (Arc<dyn BrowserEngine>, Option<Arc<dyn AppointmentBooker>>) = if args.dry_run {
        info!("Dry run: recording actions, no browser is launched");
        let booker: Arc<dyn AppointmentBooker> = Arc::new(StaticBooker::default());
        (Arc::new(RecordingEngine::all_present()) as Arc<dyn BrowserEngine>, Some(booker))
    } else {
        let playwright = PlaywrightConfig {
            viewport_width: args.viewport_width,
            viewport_height: args.viewport_height,
            browser: Browser::parse(&args.browser),
            headless: !args.headed,
            ..Default::default()
        };
        (Arc::new(PlaywrightEngine::new(playwright)?) as Arc<dyn BrowserEngine>, None)
    };

    let runner = TestRunner::load(&config, engine, builtin_scenarios(), booker)
        .with_context(|| format!("failed to load suite for environment '{}'", config.environment))?;

    if !args.dry_run && !args.skip_preflight {
        wait_for_app(&runner.deps().env.base_url, &PreflightConfig::default()).await?;
    }

    let results = match (args.spec_file, args.test_name) {
        (Some(spec_file), Some(test_name)) => runner.run_suite(&spec_file, &test_name).await?,
        (None, None) => runner.run_all().await?,
        _ => bail!("--spec-file and --test-name must be given together"),
    };

    runner.write_results(&results)?;

    Ok(results.all_passed())
}
