//! Local static server - serves the site under test on a fixed port

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::fixtures::LOCAL_PORT;
use crate::poll::{wait_until, WaitOutcome};

/// Handle to the running static file server.
///
/// At most one instance is bound to the port within a test session. The
/// listener is released on `stop()`, which also runs from `Drop` so teardown
/// happens on every exit path.
pub struct ServerHandle {
    base_url: String,
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

/// Configuration for the static server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory containing the site's static assets, served verbatim.
    pub static_dir: PathBuf,

    /// Port to bind (0 = pick a free port).
    pub port: u16,

    /// Readiness probe retry budget.
    pub probe_attempts: usize,

    /// Interval between readiness probes.
    pub probe_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("site"),
            port: LOCAL_PORT,
            probe_attempts: 20,
            probe_interval: Duration::from_millis(300),
        }
    }
}

impl ServerHandle {
    /// Bind the listener and serve `static_dir`, then block until the
    /// readiness probe succeeds or the retry budget is exhausted.
    pub async fn start(config: ServerConfig) -> HarnessResult<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HarnessError::ServerStartup(format!("failed to bind {addr}: {e}")))?;
        let port = listener.local_addr()?.port();
        let base_url = format!("http://127.0.0.1:{port}");

        info!("Serving {} at {}", config.static_dir.display(), base_url);

        let app = Router::new()
            .fallback_service(ServeDir::new(&config.static_dir))
            .layer(TraceLayer::new_for_http());

        let (tx, rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = rx.await;
            });
            if let Err(e) = serve.await {
                warn!("Static server exited with error: {}", e);
            }
        });

        let handle = ServerHandle {
            base_url,
            port,
            shutdown: Some(tx),
            join: Some(join),
        };
        handle
            .wait_for_ready(config.probe_attempts, config.probe_interval)
            .await?;
        Ok(handle)
    }

    /// Readiness policy: any HTTP response (not necessarily 200) means the
    /// server is up; no response means it is not accepting yet.
    async fn wait_for_ready(&self, attempts: usize, interval: Duration) -> HarnessResult<()> {
        let probe_url = format!("{}/index.html", self.base_url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()?;

        let budget = interval * attempts as u32;
        let outcome = wait_until(budget, interval, || {
            let client = client.clone();
            let probe_url = probe_url.clone();
            async move {
                match client.get(&probe_url).send().await {
                    Ok(_) => Ok(true),
                    Err(e) => {
                        if !e.is_connect() && !e.is_timeout() {
                            warn!("Readiness probe error: {}", e);
                        }
                        Ok(false)
                    }
                }
            }
        })
        .await?;

        match outcome {
            WaitOutcome::Satisfied => {
                info!("Static server ready at {}", self.base_url);
                Ok(())
            }
            WaitOutcome::TimedOut => Err(HarnessError::ServerUnreachable(attempts)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop the server and release the port. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            info!("Stopping static server on port {}", self.port);
            let _ = tx.send(());
        }
        if let Some(mut join) = self.join.take() {
            if tokio::time::timeout(Duration::from_secs(2), &mut join)
                .await
                .is_err()
            {
                warn!("Static server did not shut down in time, aborting task");
                join.abort();
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
