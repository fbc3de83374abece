//! Browser session manager
//!
//! One Playwright driver process per test session. The driver is a small
//! embedded Node script that launches one headless Chromium with a single
//! shared browser context, and speaks a newline-delimited JSON protocol over
//! stdin/stdout: one request per line `{id, cmd, ...}`, one response per line
//! `{id, ok, value | error}`. Each test case gets a fresh page inside the
//! shared context; the context (cookies, localStorage) persists for the whole
//! session by design.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::fixtures::UI_TIMEOUT_MS;

/// The embedded driver script. Placeholders are substituted at launch.
const DRIVER_JS: &str = r#"
// Long-lived Playwright driver: one browser + one shared context per session.
// Protocol: one JSON request per stdin line, one JSON response per stdout line.
const { chromium } = require('playwright');
const readline = require('readline');

(async () => {
  const browser = await chromium.launch({ headless: __HEADLESS__ });
  const context = await browser.newContext({
    viewport: { width: __WIDTH__, height: __HEIGHT__ }
  });
  const pages = new Map();
  let nextId = 1;

  const locate = (req) => {
    const page = pages.get(req.page);
    if (!page) throw new Error('unknown page ' + req.page);
    return page;
  };

  async function handle(req) {
    switch (req.cmd) {
      case 'new_page': {
        const page = await context.newPage();
        const id = nextId++;
        page._watched = {};
        page.on('request', (r) => {
          for (const frag of Object.keys(page._watched)) {
            if (r.url().includes(frag)) page._watched[frag] += 1;
          }
        });
        pages.set(id, page);
        return id;
      }
      case 'close_page': {
        const page = pages.get(req.page);
        if (page) await page.close();
        pages.delete(req.page);
        return null;
      }
      case 'goto':
        await locate(req).goto(req.url, { timeout: req.timeout_ms });
        return null;
      case 'click':
        await locate(req).locator(req.selector).first().click({ timeout: req.timeout_ms });
        return null;
      case 'click_containing':
        await locate(req).locator(req.selector, { hasText: req.text })
          .first().click({ timeout: req.timeout_ms });
        return null;
      case 'fill':
        await locate(req).locator(req.selector).first().fill(req.value, { timeout: req.timeout_ms });
        return null;
      case 'type':
        await locate(req).locator(req.selector).first()
          .pressSequentially(req.value, { delay: 50, timeout: req.timeout_ms });
        return null;
      case 'input_value':
        return await locate(req).locator(req.selector).first()
          .inputValue({ timeout: req.timeout_ms });
      case 'wait_selector':
        await locate(req).waitForSelector(req.selector, { state: req.state, timeout: req.timeout_ms });
        return null;
      case 'wait_function':
        await locate(req).waitForFunction(req.expression, null, { timeout: req.timeout_ms });
        return null;
      case 'wait_url':
        await locate(req).waitForURL(req.pattern, { timeout: req.timeout_ms });
        return null;
      case 'text':
        return await locate(req).locator(req.selector).first().textContent({ timeout: req.timeout_ms });
      case 'attr':
        return await locate(req).locator(req.selector).first()
          .getAttribute(req.name, { timeout: req.timeout_ms });
      case 'count':
        return await locate(req).locator(req.selector).count();
      case 'visible':
        return await locate(req).locator(req.selector).first().isVisible();
      case 'url':
        return locate(req).url();
      case 'eval':
        return await locate(req).evaluate(req.expression);
      case 'style':
        return await locate(req).locator(req.selector).first().evaluate(
          (el, prop) => window.getComputedStyle(el)[prop], req.property);
      case 'bbox':
        return await locate(req).locator(req.selector).first().boundingBox();
      case 'watch_requests':
        locate(req)._watched[req.fragment] = 0;
        return null;
      case 'request_hits':
        return locate(req)._watched[req.fragment] || 0;
      case 'watch_mutations':
        await locate(req).evaluate(([root, needle]) => {
          const target = document.querySelector(root);
          if (!target) throw new Error('mutation watch root not found: ' + root);
          window.__mutationSeen = false;
          window.__mutationObs = new MutationObserver(() => {
            if (document.querySelector(needle)) window.__mutationSeen = true;
          });
          window.__mutationObs.observe(target, { childList: true, subtree: true });
        }, [req.root, req.needle]);
        return null;
      case 'mutations_seen': {
        const page = locate(req);
        const seen = await page.evaluate(() => window.__mutationSeen === true);
        await page.evaluate(() => {
          if (window.__mutationObs) window.__mutationObs.disconnect();
        });
        return seen;
      }
      case 'shutdown':
        await browser.close();
        process.exit(0);
      default:
        throw new Error('unknown cmd: ' + req.cmd);
    }
  }

  process.stdout.write(JSON.stringify({ id: 0, ok: true, value: 'ready' }) + '\n');

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    const req = JSON.parse(line);
    try {
      const value = await handle(req);
      process.stdout.write(JSON.stringify({ id: req.id, ok: true, value }) + '\n');
    } catch (err) {
      process.stdout.write(JSON.stringify({
        id: req.id, ok: false, error: String((err && err.message) || err)
      }) + '\n');
    }
  }
  await browser.close();
})().catch((err) => { console.error(String(err)); process.exit(1); });
"#;

/// Configuration for the browser session.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Default bound applied to page operations that accept a timeout.
    pub default_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            default_timeout_ms: UI_TIMEOUT_MS,
        }
    }
}

fn render_driver_js(config: &BrowserConfig) -> String {
    DRIVER_JS
        .replace("__HEADLESS__", if config.headless { "true" } else { "false" })
        .replace("__WIDTH__", &config.viewport_width.to_string())
        .replace("__HEIGHT__", &config.viewport_height.to_string())
}

#[derive(Debug, Deserialize)]
struct DriverResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

struct DriverIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

struct DriverInner {
    io: Mutex<DriverIo>,
    next_id: AtomicU64,
}

impl DriverInner {
    async fn call(&self, mut req: Value) -> HarnessResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        req["id"] = json!(id);

        let mut io = self.io.lock().await;
        let line = serde_json::to_string(&req)?;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.write_all(b"\n").await?;
        io.stdin.flush().await?;

        loop {
            let line = io.stdout.next_line().await?.ok_or_else(|| {
                HarnessError::Driver(
                    "driver exited unexpectedly (is the Playwright browser installed? \
                     npx playwright install chromium)"
                        .to_string(),
                )
            })?;
            let resp: DriverResponse = serde_json::from_str(&line)?;
            if resp.id != id {
                warn!("Discarding out-of-order driver response (id {})", resp.id);
                continue;
            }
            return if resp.ok {
                Ok(resp.value.unwrap_or(Value::Null))
            } else {
                let msg = resp.error.unwrap_or_else(|| "unknown driver error".into());
                if msg.contains("Timeout") || msg.contains("exceeded") {
                    Err(HarnessError::Timeout(msg))
                } else {
                    Err(HarnessError::Driver(msg))
                }
            };
        }
    }
}

/// One browser process and one shared context, alive for the whole session.
pub struct BrowserSession {
    inner: Arc<DriverInner>,
    child: Child,
    default_timeout_ms: u64,
    _scratch: tempfile::TempDir,
}

impl BrowserSession {
    /// Launch the driver. Fails with [`HarnessError::DriverNotFound`] when
    /// Playwright is not installed.
    pub async fn launch(config: BrowserConfig) -> HarnessResult<Self> {
        Self::check_playwright_installed()?;

        let scratch = tempfile::tempdir()?;
        let script_path = scratch.path().join("driver.js");
        std::fs::write(&script_path, render_driver_js(&config))?;

        debug!("Launching Playwright driver: {}", script_path.display());

        let mut child = Command::new("node")
            .arg(&script_path)
            .current_dir(scratch.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::Driver(format!("failed to spawn node: {e}")))?;

        let stdin = child.stdin.take().expect("driver stdin piped");
        let stdout = BufReader::new(child.stdout.take().expect("driver stdout piped")).lines();
        let stderr = child.stderr.take().expect("driver stderr piped");
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "driver", "{}", line);
            }
        });

        let session = Self {
            inner: Arc::new(DriverInner {
                io: Mutex::new(DriverIo { stdin, stdout }),
                next_id: AtomicU64::new(1),
            }),
            child,
            default_timeout_ms: config.default_timeout_ms,
            _scratch: scratch,
        };
        session.wait_for_ready().await?;
        info!("Browser session started");
        Ok(session)
    }

    fn check_playwright_installed() -> HarnessResult<()> {
        let status = std::process::Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(HarnessError::DriverNotFound),
        }
    }

    /// The driver emits a ready line once Chromium and the shared context are
    /// up; browser startup dominates session setup time.
    async fn wait_for_ready(&self) -> HarnessResult<()> {
        let mut io = self.inner.io.lock().await;
        let line = tokio::time::timeout(Duration::from_secs(60), io.stdout.next_line())
            .await
            .map_err(|_| HarnessError::Timeout("browser session to become ready".into()))??
            .ok_or_else(|| {
                HarnessError::Driver(
                    "driver exited during startup (is the Playwright browser installed? \
                     npx playwright install chromium)"
                        .to_string(),
                )
            })?;
        let resp: DriverResponse = serde_json::from_str(&line)?;
        if resp.ok && resp.id == 0 {
            Ok(())
        } else {
            Err(HarnessError::Driver(format!("unexpected ready line: {line}")))
        }
    }

    /// Open a fresh page in the shared context, scoped to one test case.
    pub async fn new_page(&self, base_url: &str) -> HarnessResult<Page> {
        let value = self.inner.call(json!({"cmd": "new_page"})).await?;
        let id = value
            .as_u64()
            .ok_or_else(|| HarnessError::Driver(format!("bad page id: {value}")))?;
        Ok(Page {
            inner: Arc::clone(&self.inner),
            id,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms: self.default_timeout_ms,
        })
    }

    /// Close the browser and terminate the driver process.
    pub async fn shutdown(mut self) -> HarnessResult<()> {
        info!("Shutting down browser session");
        {
            let mut io = self.inner.io.lock().await;
            let _ = io.stdin.write_all(b"{\"id\":0,\"cmd\":\"shutdown\"}\n").await;
            let _ = io.stdin.flush().await;
        }
        if tokio::time::timeout(Duration::from_secs(5), self.child.wait())
            .await
            .is_err()
        {
            warn!("Driver did not exit in time, sending SIGTERM");
            if let Some(pid) = self.child.id() {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            let _ = self.child.kill().await;
        }
        Ok(())
    }
}

/// Element wait states, mirroring Playwright's selector states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    fn as_str(self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

/// Element bounding box in CSS pixels.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A page scoped to a single test case.
///
/// Selectors address the first match unless the operation is inherently
/// plural (`count`). Relative paths in `goto` resolve against the page's
/// base URL.
pub struct Page {
    inner: Arc<DriverInner>,
    id: u64,
    base_url: String,
    timeout_ms: u64,
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{base}{path}")
    }
}

impl Page {
    fn req(&self, cmd: &str) -> Value {
        json!({"cmd": cmd, "page": self.id, "timeout_ms": self.timeout_ms})
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn goto(&self, path: &str) -> HarnessResult<()> {
        let mut req = self.req("goto");
        req["url"] = json!(join_url(&self.base_url, path));
        self.inner.call(req).await.map(|_| ())
    }

    pub async fn click(&self, selector: &str) -> HarnessResult<()> {
        let mut req = self.req("click");
        req["selector"] = json!(selector);
        self.inner.call(req).await.map(|_| ())
    }

    /// Click the first match of `selector` whose text contains `text`.
    pub async fn click_containing(&self, selector: &str, text: &str) -> HarnessResult<()> {
        let mut req = self.req("click_containing");
        req["selector"] = json!(selector);
        req["text"] = json!(text);
        self.inner.call(req).await.map(|_| ())
    }

    pub async fn fill(&self, selector: &str, value: &str) -> HarnessResult<()> {
        let mut req = self.req("fill");
        req["selector"] = json!(selector);
        req["value"] = json!(value);
        self.inner.call(req).await.map(|_| ())
    }

    /// Type `value` one keystroke at a time. Needed for controlled inputs
    /// whose change handlers do not fire on a programmatic fill.
    pub async fn type_text(&self, selector: &str, value: &str) -> HarnessResult<()> {
        let mut req = self.req("type");
        req["selector"] = json!(selector);
        req["value"] = json!(value);
        self.inner.call(req).await.map(|_| ())
    }

    pub async fn input_value(&self, selector: &str) -> HarnessResult<String> {
        let mut req = self.req("input_value");
        req["selector"] = json!(selector);
        let value = self.inner.call(req).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Wait for `selector` to become visible within the default timeout.
    pub async fn wait_visible(&self, selector: &str) -> HarnessResult<()> {
        self.wait_state(selector, WaitState::Visible, self.timeout_ms)
            .await
    }

    pub async fn wait_state(
        &self,
        selector: &str,
        state: WaitState,
        timeout_ms: u64,
    ) -> HarnessResult<()> {
        let mut req = self.req("wait_selector");
        req["selector"] = json!(selector);
        req["state"] = json!(state.as_str());
        req["timeout_ms"] = json!(timeout_ms);
        self.inner.call(req).await.map(|_| ())
    }

    /// Wait for a JS predicate (a function expression) to become truthy.
    pub async fn wait_function(&self, expression: &str, timeout_ms: u64) -> HarnessResult<()> {
        let mut req = self.req("wait_function");
        req["expression"] = json!(expression);
        req["timeout_ms"] = json!(timeout_ms);
        self.inner.call(req).await.map(|_| ())
    }

    /// Wait for the page URL to match a glob pattern such as `**/station.html**`.
    pub async fn wait_url(&self, pattern: &str) -> HarnessResult<()> {
        let mut req = self.req("wait_url");
        req["pattern"] = json!(pattern);
        self.inner.call(req).await.map(|_| ())
    }

    pub async fn text_content(&self, selector: &str) -> HarnessResult<String> {
        let mut req = self.req("text");
        req["selector"] = json!(selector);
        let value = self.inner.call(req).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn attribute(&self, selector: &str, name: &str) -> HarnessResult<Option<String>> {
        let mut req = self.req("attr");
        req["selector"] = json!(selector);
        req["name"] = json!(name);
        let value = self.inner.call(req).await?;
        Ok(value.as_str().map(str::to_string))
    }

    pub async fn count(&self, selector: &str) -> HarnessResult<usize> {
        let mut req = self.req("count");
        req["selector"] = json!(selector);
        let value = self.inner.call(req).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    pub async fn is_visible(&self, selector: &str) -> HarnessResult<bool> {
        let mut req = self.req("visible");
        req["selector"] = json!(selector);
        let value = self.inner.call(req).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn url(&self) -> HarnessResult<String> {
        let value = self.inner.call(self.req("url")).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Evaluate a JS expression or function expression in the page.
    pub async fn evaluate(&self, expression: &str) -> HarnessResult<Value> {
        let mut req = self.req("eval");
        req["expression"] = json!(expression);
        self.inner.call(req).await
    }

    pub async fn computed_style(&self, selector: &str, property: &str) -> HarnessResult<String> {
        let mut req = self.req("style");
        req["selector"] = json!(selector);
        req["property"] = json!(property);
        let value = self.inner.call(req).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn bounding_box(&self, selector: &str) -> HarnessResult<Option<BoundingBox>> {
        let mut req = self.req("bbox");
        req["selector"] = json!(selector);
        let value = self.inner.call(req).await?;
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(serde_json::from_value(value)?))
        }
    }

    /// Start counting requests whose URL contains `fragment`.
    pub async fn watch_requests(&self, fragment: &str) -> HarnessResult<()> {
        let mut req = self.req("watch_requests");
        req["fragment"] = json!(fragment);
        self.inner.call(req).await.map(|_| ())
    }

    pub async fn request_hits(&self, fragment: &str) -> HarnessResult<usize> {
        let mut req = self.req("request_hits");
        req["fragment"] = json!(fragment);
        let value = self.inner.call(req).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    /// Install a MutationObserver on the subtree rooted at `root` that flags
    /// any appearance of `needle`, even transiently. This observes every
    /// mutation in the window rather than sampling, which point-in-time
    /// polling cannot guarantee.
    pub async fn watch_mutations(&self, root: &str, needle: &str) -> HarnessResult<()> {
        let mut req = self.req("watch_mutations");
        req["root"] = json!(root);
        req["needle"] = json!(needle);
        self.inner.call(req).await.map(|_| ())
    }

    /// Read the accumulated observation flag and disconnect the observer.
    pub async fn mutations_seen(&self) -> HarnessResult<bool> {
        let value = self.inner.call(self.req("mutations_seen")).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn close(&self) -> HarnessResult<()> {
        self.inner.call(self.req("close_page")).await.map(|_| ())
    }
}
