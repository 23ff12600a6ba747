//! webtest CLI - runs YAML test suites.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use webtest::result::render_text;
use webtest::{Engine, Outcome, Results, SuiteLoader, TestRunner, TestSuite};

/// Declarative SOAP, REST and JDBC test runner.
#[derive(Parser, Debug)]
#[command(name = "webtest", version, about)]
struct Cli {
    /// Suite file or directory.
    #[arg(short = 'p', long = "path")]
    path: Option<PathBuf>,

    /// Only run tests whose name contains this text (case-insensitive).
    #[arg(short = 'f', long = "filter")]
    filter: Option<String>,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// HTTP timeout in seconds per step.
    #[arg(short = 't', long = "timeout")]
    timeout: Option<u64>,

    /// Base directory for included files, SOAP bodies and schemas.
    #[arg(long = "resource-dir", env = "WEBTEST_RESOURCE_DIR")]
    resource_dir: Option<PathBuf>,

    /// Directory to save report files.
    #[arg(short = 'r', long = "report-dir")]
    report_dir: Option<PathBuf>,

    /// Report file format.
    #[arg(long = "report-format", default_value = "json")]
    report_format: ReportFormat,

    /// Global property override, repeatable.
    #[arg(short = 'D', long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum ReportFormat {
    Json,
    Text,
}

fn parse_property(text: &str) -> Result<(String, String), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{text}'"))?;
    if key.is_empty() {
        return Err("property name is empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .try_init();
}

fn load_suites(path: Option<&Path>) -> Result<Vec<TestSuite>> {
    let loader = SuiteLoader::new();
    let suites = match path {
        Some(path) if !path.exists() => bail!("Path does not exist: {}", path.display()),
        Some(path) => loader
            .load_path(path)
            .with_context(|| format!("Failed to load suites from {}", path.display()))?,
        None => loader.load_all_suites()?,
    };
    if suites.is_empty() {
        return Err(anyhow!("No test suites found"));
    }
    Ok(suites)
}

fn apply_overrides(suite: &mut TestSuite, cli: &Cli) {
    if let Some(timeout) = cli.timeout {
        suite.config.timeout = timeout;
    }
    if let Some(dir) = &cli.resource_dir {
        suite.config.resource_dir = dir.clone();
    }
    for (key, value) in &cli.properties {
        suite.config.properties.set(key, Some(value.clone()));
    }
    if let Some(filter) = &cli.filter {
        let filter = filter.to_lowercase();
        suite
            .tests
            .retain(|test| test.name.to_lowercase().contains(&filter));
    }
}

fn save_report(
    suite: &TestSuite,
    results: &Results,
    report_dir: &Path,
    format: ReportFormat,
) -> Result<PathBuf> {
    fs::create_dir_all(report_dir)
        .with_context(|| format!("Failed to create {}", report_dir.display()))?;

    let timestamp = Utc::now().timestamp();
    let name = suite.name.replace([' ', '/'], "_");
    let (filename, content) = match format {
        ReportFormat::Json => (
            format!("{name}-{timestamp}.json"),
            serde_json::to_string_pretty(results)?,
        ),
        ReportFormat::Text => (format!("{name}-{timestamp}.txt"), render_text(results)?),
    };

    let path = report_dir.join(filename);
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut suites = load_suites(cli.path.as_deref())?;
    for suite in &mut suites {
        apply_overrides(suite, &cli);
    }
    suites.retain(|suite| !suite.tests.is_empty());
    if suites.is_empty() {
        bail!("No tests matching the filter were found");
    }

    let engine = Engine::new();
    let start = Instant::now();
    let mut passed = 0;
    let mut failed = 0;

    for suite in &suites {
        let results = engine.run(suite).await;
        print!("{}", render_text(&results)?);

        for test in &results.tests {
            if test.success() {
                passed += 1;
            } else {
                failed += 1;
            }
        }
        if results.aborted.is_some() {
            failed += 1;
        }

        if let Some(dir) = &cli.report_dir {
            match save_report(suite, &results, dir, cli.report_format) {
                Ok(path) => info!("Report saved: {}", path.display()),
                Err(e) => error!("Failed to save report: {:#}", e),
            }
        }
    }

    info!(
        "Summary: {} passed, {} failed in {} ms",
        passed,
        failed,
        start.elapsed().as_millis()
    );

    if failed > 0 {
        exit(1);
    }
    Ok(())
}
