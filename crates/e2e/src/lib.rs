//! CTAN Bus Tracker E2E Harness
//!
//! This crate provides a Rust-controlled E2E testing harness that:
//! - Serves the static bus-tracker site on a fixed local port
//! - Controls a persistent Playwright browser via a JSON line protocol
//! - Runs contract tests against the live CTAN API
//! - Selects suites by name and reports pass/fail/skip per case
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  suite::run                                                 │
//! │    ├── Session::start -> ServerHandle + BrowserSession      │
//! │    ├── per case: BrowserSession::new_page -> Page           │
//! │    ├── Page::{goto, click, fill, wait_*, watch_*}           │
//! │    └── ApiClient::get_json (contract oracles)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  node driver.js (one per session)                           │
//! │    ├── one Chromium process, one shared BrowserContext      │
//! │    └── pages keyed by id, one per test case                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The browser context is deliberately shared across a whole session, so
//! persisted client-side state (such as the language cookie) carries between
//! cases exactly as it would for a real visitor. Tests must not assume a
//! clean slate for such preferences.

pub mod api;
pub mod driver;
pub mod error;
pub mod fixtures;
pub mod poll;
pub mod server;
pub mod session;
pub mod suite;

pub use driver::{BrowserSession, Page};
pub use error::{HarnessError, HarnessResult};
pub use session::Session;
pub use suite::{Case, Suite};
