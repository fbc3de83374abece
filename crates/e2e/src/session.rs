//! Fixture lifecycle controller
//!
//! Each resource moves strictly NotStarted -> Running -> Stopped: the
//! `Option` slots are filled once at `start` and drained once at `shutdown`.
//! Teardown runs on every exit path; the handles' `Drop` impls are the
//! backstop when `shutdown` cannot be awaited.

use tracing::{info, warn};

use crate::driver::{BrowserConfig, BrowserSession};
use crate::error::HarnessResult;
use crate::server::{ServerConfig, ServerHandle};

/// What the selected suites need from the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionPlan {
    pub local_server: bool,
    pub browser: bool,
}

pub struct Session {
    server: Option<ServerHandle>,
    browser: Option<BrowserSession>,
}

impl Session {
    /// Start the browser first: when Playwright is missing there is no point
    /// binding the port, and the caller can degrade to skipping UI suites.
    /// A server that never becomes reachable is fatal.
    pub async fn start(
        plan: SessionPlan,
        server_config: ServerConfig,
        browser_config: BrowserConfig,
    ) -> HarnessResult<Self> {
        let browser = if plan.browser {
            Some(BrowserSession::launch(browser_config).await?)
        } else {
            None
        };
        let server = if plan.local_server {
            Some(ServerHandle::start(server_config).await?)
        } else {
            None
        };
        Ok(Self { server, browser })
    }

    pub fn browser(&self) -> Option<&BrowserSession> {
        self.browser.as_ref()
    }

    pub fn local_base(&self) -> Option<&str> {
        self.server.as_ref().map(|s| s.base_url())
    }

    pub async fn shutdown(mut self) {
        if let Some(browser) = self.browser.take() {
            if let Err(e) = browser.shutdown().await {
                warn!("Browser shutdown failed: {}", e);
            }
        }
        if let Some(mut server) = self.server.take() {
            server.stop().await;
        }
        info!("Session torn down");
    }
}
