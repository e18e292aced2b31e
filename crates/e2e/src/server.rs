//! Server management - spawning and health checking the app under test

use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::wait::poll_until;

/// Handle to a running server process
pub struct ServerHandle {
    child: Child,
    pub base_url: String,
    pub port: u16,
}

impl ServerHandle {
    /// Spawn the server command and wait until it answers HTTP requests
    pub async fn spawn(config: ServerConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://{}:{}", config.host, port);
        let command = config.command_line(port);

        info!("Spawning server on port {}: {}", port, command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .env("PORT", port.to_string())
            .env("HOST", &config.host)
            .envs(config.env.iter().map(|(k, v)| (k, v)))
            .stdout(Stdio::null())
            .stderr(if config.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            });

        let child = cmd
            .spawn()
            .map_err(|e| E2eError::ServerStartup(format!("Failed to spawn `{}`: {}", command, e)))?;

        let mut handle = ServerHandle {
            child,
            base_url,
            port,
        };

        let health_url = format!("{}{}", handle.base_url, config.health_path);
        if let Err(e) = wait_until_reachable(&health_url, config.startup_timeout).await {
            if let Ok(Some(status)) = handle.child.try_wait() {
                return Err(E2eError::ServerStartup(format!("`{}` exited with {}", command, status)));
            }
            return Err(e);
        }

        info!("Server is healthy at {}", handle.base_url);
        Ok(handle)
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server
    pub fn stop(&mut self) -> E2eResult<()> {
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }
        info!("Stopping server (pid: {})", self.child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = self.child.kill();
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Wait until `url` answers with any non-5xx status.
pub async fn wait_until_reachable(url: &str, timeout: Duration) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let mut attempts = 0;
    let waited = poll_until("server health check", timeout, || {
        attempts += 1;
        let first = attempts == 1;
        let client = &client;
        async move {
            match client.get(url).send().await {
                Ok(resp) if !resp.status().is_server_error() => Ok(Some(())),
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                    Ok(None)
                }
                Err(e) => {
                    if first {
                        info!("Waiting for server to start...");
                    }
                    // Connection refused is expected while server is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                    Ok(None)
                }
            }
        }
    })
    .await;

    match waited {
        Ok(()) => Ok(()),
        Err(e) if e.is_timeout() => Err(E2eError::ServerHealthCheck(attempts)),
        Err(e) => Err(e),
    }
}

/// Configuration for spawning a server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Shell command; `{host}` and `{port}` are substituted
    pub command: String,

    pub host: String,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Path polled until the server answers
    pub health_path: String,

    /// Timeout for server startup
    pub startup_timeout: Duration,

    /// Extra environment for the server process
    pub env: Vec<(String, String)>,

    pub inherit_stderr: bool,
}

impl ServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            host: "127.0.0.1".to_string(),
            port: None,
            health_path: "/".to_string(),
            startup_timeout: Duration::from_secs(30),
            env: Vec::new(),
            inherit_stderr: true,
        }
    }

    fn command_line(&self, port: u16) -> String {
        self.command
            .replace("{host}", &self.host)
            .replace("{port}", &port.to_string())
    }
}

/// Find a free port to use
pub fn find_free_port() -> E2eResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
