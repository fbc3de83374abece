//! Suite registry, selection, and the sequential case runner

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::api::ApiClient;
use crate::driver::{BrowserConfig, Page};
use crate::error::{HarnessError, HarnessResult};
use crate::server::ServerConfig;
use crate::session::{Session, SessionPlan};

pub type CaseFuture<'a> = Pin<Box<dyn Future<Output = HarnessResult<()>> + 'a>>;

/// A case body: contract tests get the API client, UI tests get a fresh page.
pub enum CaseRun {
    Api(for<'a> fn(&'a ApiClient) -> CaseFuture<'a>),
    Ui(for<'a> fn(&'a Page) -> CaseFuture<'a>),
}

pub struct Case {
    pub name: &'static str,
    pub tags: &'static [&'static str],
    pub run: CaseRun,
}

impl Case {
    /// Contract test against the live API; tagged so `--skip-network` can
    /// gate it in offline CI.
    pub fn api(name: &'static str, f: for<'a> fn(&'a ApiClient) -> CaseFuture<'a>) -> Self {
        Case {
            name,
            tags: &["network"],
            run: CaseRun::Api(f),
        }
    }

    /// UI test that only touches local fixtures.
    pub fn ui(name: &'static str, f: for<'a> fn(&'a Page) -> CaseFuture<'a>) -> Self {
        Case {
            name,
            tags: &[],
            run: CaseRun::Ui(f),
        }
    }

    /// UI test whose page fetches live API data; gated like [`Case::api`].
    pub fn ui_network(name: &'static str, f: for<'a> fn(&'a Page) -> CaseFuture<'a>) -> Self {
        Case {
            name,
            tags: &["network"],
            run: CaseRun::Ui(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteKind {
    /// Contract tests; no server, no browser.
    Api,
    /// Browser tests against the locally served static site.
    LocalUi,
    /// Browser tests against the Next.js rewrite at `NX_BASE_URL`.
    NextUi,
}

pub struct Suite {
    pub name: &'static str,
    pub kind: SuiteKind,
    /// Whether the suite runs when no suite name is given.
    pub default: bool,
    pub cases: Vec<Case>,
}

/// Runner-owned boolean flags that may appear on either side of the suite
/// name. Flags taking a value are positional-only and stay with clap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrailingFlags {
    pub skip_network: bool,
    pub headed: bool,
}

/// Pull known boolean flags out of the trailing args; everything left over
/// is passthrough.
pub fn scavenge_flags(rest: &mut Vec<String>) -> TrailingFlags {
    let mut flags = TrailingFlags::default();
    rest.retain(|a| match a.as_str() {
        "--skip-network" => {
            flags.skip_network = true;
            false
        }
        "--headed" => {
            flags.headed = true;
            false
        }
        _ => true,
    });
    flags
}

/// Map a recognized leading suite name to that suite alone; anything else is
/// passthrough (never an error), with every default suite selected.
pub fn select(all: Vec<Suite>, args: &[String]) -> (Vec<Suite>, Vec<String>) {
    if let Some(first) = args.first() {
        if all.iter().any(|s| s.name == first.as_str()) {
            let selected = all
                .into_iter()
                .filter(|s| s.name == first.as_str())
                .collect();
            return (selected, args[1..].to_vec());
        }
    }
    (all.into_iter().filter(|s| s.default).collect(), args.to_vec())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub suite: String,
    pub name: String,
    pub status: CaseStatus,
    pub duration_ms: u64,
    /// Failure message, or the skip reason for skipped cases.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub cases: Vec<CaseReport>,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

/// Runner configuration assembled by the CLI entry point.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Skip cases tagged `network`. Live traffic is the default; this is
    /// the offline-CI escape hatch.
    pub skip_network: bool,
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub nx_base_url: String,
    pub output_dir: PathBuf,
}

/// Run the selected suites sequentially.
///
/// A failed case is recorded and the run continues; only setup failures
/// (an unreachable static server) abort the whole run. Teardown executes
/// regardless of case outcomes.
pub async fn run(
    suites: Vec<Suite>,
    passthrough: &[String],
    opts: &RunOptions,
) -> HarnessResult<RunSummary> {
    let started = Instant::now();

    // Non-flag passthrough args are case-name filters; unknown flags are
    // accepted and ignored, matching the original runner's contract.
    let filters: Vec<&str> = passthrough
        .iter()
        .filter(|a| !a.starts_with('-'))
        .map(String::as_str)
        .collect();
    for flag in passthrough.iter().filter(|a| a.starts_with('-')) {
        warn!("Ignoring unrecognized flag {:?}", flag);
    }

    let suites: Vec<Suite> = suites
        .into_iter()
        .map(|mut s| {
            if !filters.is_empty() {
                s.cases.retain(|c| filters.iter().any(|f| c.name.contains(f)));
            }
            s
        })
        .filter(|s| !s.cases.is_empty())
        .collect();

    let runnable = |c: &Case| !opts.skip_network || !c.tags.contains(&"network");

    let needs_browser = suites
        .iter()
        .any(|s| s.kind != SuiteKind::Api && s.cases.iter().any(|c| runnable(c)));
    let needs_server = suites
        .iter()
        .any(|s| s.kind == SuiteKind::LocalUi && s.cases.iter().any(|c| runnable(c)));

    let plan = SessionPlan {
        local_server: needs_server,
        browser: needs_browser,
    };

    let mut ui_unavailable: Option<String> = None;
    let session = if plan.browser || plan.local_server {
        match Session::start(plan, opts.server.clone(), opts.browser.clone()).await {
            Ok(s) => Some(s),
            Err(e @ (HarnessError::DriverNotFound | HarnessError::Driver(_))) => {
                warn!("Browser unavailable - UI suites will be skipped: {}", e);
                ui_unavailable = Some(e.to_string());
                None
            }
            // Server startup failures are fatal before any test executes.
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    let api = ApiClient::new()?;

    let mut cases_out: Vec<CaseReport> = Vec::new();
    let (mut passed, mut failed, mut skipped) = (0usize, 0usize, 0usize);

    for suite in &suites {
        info!("Running suite '{}' ({} case(s))", suite.name, suite.cases.len());

        for case in &suite.cases {
            let case_started = Instant::now();

            let skip_reason = if !runnable(case) {
                Some("skipped via --skip-network".to_string())
            } else if matches!(case.run, CaseRun::Ui(_)) && session.is_none() {
                Some(
                    ui_unavailable
                        .clone()
                        .unwrap_or_else(|| "browser unavailable".to_string()),
                )
            } else {
                None
            };

            if let Some(reason) = skip_reason {
                skipped += 1;
                info!("- {}::{} (skipped: {})", suite.name, case.name, reason);
                cases_out.push(CaseReport {
                    suite: suite.name.to_string(),
                    name: case.name.to_string(),
                    status: CaseStatus::Skipped,
                    duration_ms: 0,
                    detail: Some(reason),
                });
                continue;
            }

            let result = match &case.run {
                CaseRun::Api(f) => f(&api).await,
                CaseRun::Ui(f) => {
                    let session = session.as_ref().expect("session present for UI case");
                    let base = match suite.kind {
                        SuiteKind::NextUi => opts.nx_base_url.clone(),
                        _ => session
                            .local_base()
                            .unwrap_or(&opts.nx_base_url)
                            .to_string(),
                    };
                    run_ui_case(session, &base, *f).await
                }
            };

            let duration_ms = case_started.elapsed().as_millis() as u64;
            match result {
                Ok(()) => {
                    passed += 1;
                    info!("✓ {}::{} ({} ms)", suite.name, case.name, duration_ms);
                    cases_out.push(CaseReport {
                        suite: suite.name.to_string(),
                        name: case.name.to_string(),
                        status: CaseStatus::Passed,
                        duration_ms,
                        detail: None,
                    });
                }
                Err(e) => {
                    failed += 1;
                    error!("✗ {}::{} - {}", suite.name, case.name, e);
                    cases_out.push(CaseReport {
                        suite: suite.name.to_string(),
                        name: case.name.to_string(),
                        status: CaseStatus::Failed,
                        duration_ms,
                        detail: Some(e.to_string()),
                    });
                }
            }
        }
    }

    if let Some(session) = session {
        session.shutdown().await;
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "Test results: {} passed, {} failed, {} skipped ({} ms)",
        passed, failed, skipped, duration_ms
    );

    Ok(RunSummary {
        total: cases_out.len(),
        passed,
        failed,
        skipped,
        duration_ms,
        cases: cases_out,
    })
}

/// Each case gets a fresh page, closed when the case ends. A page that fails
/// to open is an infrastructure failure for this case only.
async fn run_ui_case(
    session: &Session,
    base_url: &str,
    f: for<'a> fn(&'a Page) -> CaseFuture<'a>,
) -> HarnessResult<()> {
    let browser = session
        .browser()
        .ok_or_else(|| HarnessError::Driver("no browser in session".to_string()))?;
    let page = browser.new_page(base_url).await?;
    let result = f(&page).await;
    if let Err(e) = page.close().await {
        warn!("Failed to close page: {}", e);
    }
    result
}

/// Write the machine-readable run report.
pub fn write_results(summary: &RunSummary, dir: &Path) -> HarnessResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("test-results.json");
    std::fs::write(&path, serde_json::to_string_pretty(summary)?)?;
    info!("Results written to: {}", path.display());
    Ok(path)
}
