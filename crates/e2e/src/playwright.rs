//! Playwright browser automation
//!
//! A single `node` process runs the bridge script in `js/bridge.js` and keeps
//! the browser alive for the whole run. Requests and replies are single-line
//! JSON objects correlated by id, so any number of browser contexts can share
//! the process concurrently.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::page::{BrowserPage, DialogAction, PageFactory, Viewport};

const BRIDGE_SCRIPT: &str = include_str!("../js/bridge.js");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,

    /// Node executable used to run the bridge
    pub node_binary: PathBuf,

    /// Exported as `NODE_PATH` so the bridge can resolve `playwright`
    pub node_modules: Option<PathBuf>,

    /// Upper bound for a single fill/click/select inside the browser
    pub action_timeout: Duration,

    /// Upper bound for page loads
    pub navigation_timeout: Duration,

    /// Upper bound for any bridge round trip
    pub request_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            node_binary: PathBuf::from("node"),
            node_modules: None,
            action_timeout: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    NewContext { viewport: Viewport },
    Goto { context: u64, url: &'a str, timeout_ms: u64 },
    Url { context: u64 },
    Count { context: u64, selector: &'a str },
    Fill { context: u64, selector: &'a str, value: &'a str, timeout_ms: u64 },
    Click { context: u64, selector: &'a str, timeout_ms: u64 },
    Select { context: u64, selector: &'a str, value: &'a str, timeout_ms: u64 },
    Check { context: u64, selector: &'a str, timeout_ms: u64 },
    IsVisible { context: u64, selector: &'a str },
    TextContent { context: u64, selector: &'a str },
    ArmDialog { context: u64, accept: bool },
    SetViewport { context: u64, viewport: Viewport },
    CloseContext { context: u64 },
    Shutdown,
}

impl Request<'_> {
    fn op(&self) -> &'static str {
        match self {
            Request::NewContext { .. } => "new_context",
            Request::Goto { .. } => "goto",
            Request::Url { .. } => "url",
            Request::Count { .. } => "count",
            Request::Fill { .. } => "fill",
            Request::Click { .. } => "click",
            Request::Select { .. } => "select",
            Request::Check { .. } => "check",
            Request::IsVisible { .. } => "is_visible",
            Request::TextContent { .. } => "text_content",
            Request::ArmDialog { .. } => "arm_dialog",
            Request::SetViewport { .. } => "set_viewport",
            Request::CloseContext { .. } => "close_context",
            Request::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

fn encode(id: u64, request: &Request<'_>) -> E2eResult<String> {
    let mut message = serde_json::to_value(request)?;
    message["id"] = serde_json::Value::from(id);
    Ok(serde_json::to_string(&message)?)
}

/// The node process plus the plumbing that multiplexes requests over it.
struct Bridge {
    outgoing: mpsc::UnboundedSender<String>,
    pending: Pending,
    next_id: AtomicU64,
    request_timeout: Duration,
    child: tokio::sync::Mutex<Child>,
    _script_dir: TempDir,
}

impl Bridge {
    fn spawn(config: &PlaywrightConfig) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut cmd = TokioCommand::new(&config.node_binary);
        cmd.arg(&script_path)
            .env("CALC_E2E_BROWSER", config.browser.as_str())
            .env("CALC_E2E_HEADLESS", if config.headless { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_modules) = &config.node_modules {
            cmd.env("NODE_PATH", node_modules);
        }

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::Bridge(format!(
                "failed to spawn {}: {}",
                config.node_binary.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Bridge("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Bridge("bridge stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| E2eError::Bridge("bridge stderr unavailable".to_string()))?;

        let pending: Pending = Arc::default();
        let (outgoing, requests) = mpsc::unbounded_channel();

        tokio::spawn(write_requests(stdin, requests));
        tokio::spawn(read_responses(stdout, Arc::clone(&pending)));
        tokio::spawn(forward_stderr(stderr));

        Ok(Self {
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            request_timeout: config.request_timeout,
            child: tokio::sync::Mutex::new(child),
            _script_dir: script_dir,
        })
    }

    async fn call(&self, request: Request<'_>) -> E2eResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = encode(id, &request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if self.outgoing.send(line).is_err() {
            self.pending.lock().remove(&id);
            return Err(E2eError::Bridge("bridge process has exited".to_string()));
        }

        let response = match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(E2eError::Bridge(format!(
                    "bridge exited before answering {}",
                    request.op()
                )));
            }
            Err(_) => {
                self.pending.lock().remove(&id);
                return Err(E2eError::timeout(
                    format!("bridge reply to {}", request.op()),
                    self.request_timeout,
                ));
            }
        };

        if response.ok {
            Ok(response.value)
        } else {
            Err(E2eError::Bridge(format!(
                "{} failed: {}",
                request.op(),
                response.error.unwrap_or_else(|| "unknown error".to_string())
            )))
        }
    }

    /// Fire and forget; the reply is dropped by the reader.
    fn send_detached(&self, request: Request<'_>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(line) = encode(id, &request) {
            let _ = self.outgoing.send(line);
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

async fn write_requests(mut stdin: ChildStdin, mut requests: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = requests.recv().await {
        if let Err(e) = write_line(&mut stdin, &line).await {
            warn!("Playwright bridge stdin closed: {}", e);
            break;
        }
    }
}

async fn read_responses(stdout: ChildStdout, pending: Pending) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<Response>(&line) {
                Ok(response) => {
                    let waiter = pending.lock().remove(&response.id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => debug!("Unclaimed bridge reply {}", response.id),
                    }
                }
                Err(_) => debug!("[playwright] {}", line),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read from Playwright bridge: {}", e);
                break;
            }
        }
    }

    // Dropping the senders fails every call still in flight.
    pending.lock().clear();
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("[playwright] {}", line);
    }
}

/// Playwright browser handle, one per run.
pub struct PlaywrightDriver {
    bridge: Arc<Bridge>,
    config: PlaywrightConfig,
}

impl PlaywrightDriver {
    /// Check for Playwright and start the bridge process.
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed().await?;

        let bridge = Bridge::spawn(&config)?;
        info!("Playwright bridge started ({})", config.browser.as_str());

        Ok(Self {
            bridge: Arc::new(bridge),
            config,
        })
    }

    /// Check if Playwright is installed
    async fn check_playwright_installed() -> E2eResult<()> {
        let status = TokioCommand::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Close every context and the browser, then reap the node process.
    pub async fn shutdown(&self) -> E2eResult<()> {
        let result = self.bridge.call(Request::Shutdown).await;

        let mut child = self.bridge.child.lock().await;
        if timeout(Duration::from_secs(5), child.wait()).await.is_err() {
            warn!("Playwright bridge did not exit, killing it");
            let _ = child.kill().await;
        }

        result.map(|_| ())
    }
}

#[async_trait]
impl PageFactory for PlaywrightDriver {
    type Page = PlaywrightPage;

    async fn new_page(&self, viewport: Viewport) -> E2eResult<PlaywrightPage> {
        let value = self.bridge.call(Request::NewContext { viewport }).await?;
        let context = value
            .as_u64()
            .ok_or_else(|| E2eError::Bridge(format!("unexpected context id {value}")))?;

        debug!("Opened browser context {}", context);
        Ok(PlaywrightPage {
            bridge: Arc::clone(&self.bridge),
            context,
            action_timeout_ms: self.config.action_timeout.as_millis() as u64,
            navigation_timeout_ms: self.config.navigation_timeout.as_millis() as u64,
            closed: AtomicBool::new(false),
        })
    }
}

/// A browser context living in the bridge process.
///
/// Dropping an unclosed page still asks the bridge to close its context.
pub struct PlaywrightPage {
    bridge: Arc<Bridge>,
    context: u64,
    action_timeout_ms: u64,
    navigation_timeout_ms: u64,
    closed: AtomicBool,
}

fn unexpected(op: &str, value: &serde_json::Value) -> E2eError {
    E2eError::Bridge(format!("unexpected {op} reply: {value}"))
}

#[async_trait]
impl BrowserPage for PlaywrightPage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.bridge
            .call(Request::Goto {
                context: self.context,
                url,
                timeout_ms: self.navigation_timeout_ms,
            })
            .await?;
        Ok(())
    }

    async fn url(&self) -> E2eResult<String> {
        let value = self.bridge.call(Request::Url { context: self.context }).await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| unexpected("url", &value))
    }

    async fn count(&self, selector: &str) -> E2eResult<usize> {
        let value = self
            .bridge
            .call(Request::Count {
                context: self.context,
                selector,
            })
            .await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| unexpected("count", &value))
    }

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.bridge
            .call(Request::Fill {
                context: self.context,
                selector,
                value,
                timeout_ms: self.action_timeout_ms,
            })
            .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.bridge
            .call(Request::Click {
                context: self.context,
                selector,
                timeout_ms: self.action_timeout_ms,
            })
            .await?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.bridge
            .call(Request::Select {
                context: self.context,
                selector,
                value,
                timeout_ms: self.action_timeout_ms,
            })
            .await?;
        Ok(())
    }

    async fn check(&self, selector: &str) -> E2eResult<()> {
        self.bridge
            .call(Request::Check {
                context: self.context,
                selector,
                timeout_ms: self.action_timeout_ms,
            })
            .await?;
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> E2eResult<bool> {
        let value = self
            .bridge
            .call(Request::IsVisible {
                context: self.context,
                selector,
            })
            .await?;
        value.as_bool().ok_or_else(|| unexpected("is_visible", &value))
    }

    async fn text_content(&self, selector: &str) -> E2eResult<Option<String>> {
        let value = self
            .bridge
            .call(Request::TextContent {
                context: self.context,
                selector,
            })
            .await?;
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(text) => Ok(Some(text)),
            other => Err(unexpected("text_content", &other)),
        }
    }

    async fn arm_dialog(&self, action: DialogAction) -> E2eResult<()> {
        self.bridge
            .call(Request::ArmDialog {
                context: self.context,
                accept: action == DialogAction::Accept,
            })
            .await?;
        Ok(())
    }

    async fn set_viewport(&self, viewport: Viewport) -> E2eResult<()> {
        self.bridge
            .call(Request::SetViewport {
                context: self.context,
                viewport,
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> E2eResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.bridge
            .call(Request::CloseContext { context: self.context })
            .await?;
        debug!("Closed browser context {}", self.context);
        Ok(())
    }
}

impl Drop for PlaywrightPage {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.bridge
                .send_detached(Request::CloseContext { context: self.context });
        }
    }
}
