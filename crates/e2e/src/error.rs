//! Error types for the harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Static server failed to start: {0}")]
    ServerStartup(String),

    #[error("Static server never became reachable after {0} probe attempts")]
    ServerUnreachable(usize),

    #[error("Playwright not found. Install with: npm i playwright && npx playwright install chromium")]
    DriverNotFound,

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Timed out waiting for: {0}")]
    Timeout(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
