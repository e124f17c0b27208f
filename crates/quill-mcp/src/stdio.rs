//! Stdio transport: spawn a tool server as a child process and speak
//! line-delimited JSON-RPC over its stdin/stdout. Stderr is drained into
//! the log so a crashing server leaves a trace.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::backend::ToolBackend;
use crate::config::ServerConfig;
use crate::error::{BackendError, Result};
use crate::protocol::{
    BackendTool, CallResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse,
};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

pub struct StdioBackend {
    name: String,
    stdin: Mutex<Option<ChildStdin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    request_timeout: Duration,
    child: StdMutex<Option<Child>>,
    reader: JoinHandle<()>,
    stderr_logger: Option<JoinHandle<()>>,
}

impl StdioBackend {
    /// Launch the configured server process and start the response reader.
    /// The backend is not usable until [`initialize`](Self::initialize) has
    /// completed the protocol handshake.
    pub async fn spawn(name: impl Into<String>, config: &ServerConfig) -> Result<Self> {
        let name = name.into();

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            BackendError::Transport(format!("failed to spawn '{}': {}", config.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Transport("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Transport("child stdout unavailable".to_string()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_responses(name.clone(), stdout, Arc::clone(&pending)));

        let stderr_logger = child.stderr.take().map(|stderr| {
            let server = name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "stderr: {}", line);
                }
            })
        });

        Ok(Self {
            name,
            stdin: Mutex::new(Some(stdin)),
            pending,
            next_id: AtomicU64::new(1),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            child: StdMutex::new(Some(child)),
            reader,
            stderr_logger,
        })
    }

    /// Perform the `initialize` handshake and send the follow-up
    /// `notifications/initialized`.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self.request("initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        self.notify("notifications/initialized", None).await?;

        debug!(
            server = %self.name,
            peer = %init.server_info.name,
            "backend initialized"
        );
        Ok(init)
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.write_line(&serde_json::to_string(&request)?).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(BackendError::Disconnected);
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(BackendError::Timeout(format!(
                    "{} on '{}'",
                    method, self.name
                )));
            }
        };

        if let Some(error) = response.error {
            return Err(BackendError::Protocol(format!(
                "{} failed: {} (code {})",
                method, error.message, error.code
            )));
        }
        response
            .result
            .ok_or_else(|| BackendError::Protocol(format!("{} returned no result", method)))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        self.write_line(&serde_json::to_string(&notification)?).await
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(BackendError::Disconnected)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Stop the server process. Gives it a grace period after stdin closes,
    /// then kills it.
    pub async fn shutdown(&self) {
        let child = self.child.lock().ok().and_then(|mut guard| guard.take());
        if let Some(mut child) = child {
            // Dropping stdin closes the pipe; well-behaved servers exit on EOF.
            drop(self.stdin.lock().await.take());

            match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(server = %self.name, "backend exited: {}", status);
                }
                Ok(Err(e)) => {
                    warn!(server = %self.name, "wait failed: {}", e);
                }
                Err(_) => {
                    warn!(server = %self.name, "backend did not exit, killing");
                    if let Err(e) = child.kill().await {
                        error!(server = %self.name, "kill failed: {}", e);
                    }
                }
            }
        }

        self.reader.abort();
        if let Some(logger) = &self.stderr_logger {
            logger.abort();
        }
    }
}

impl Drop for StdioBackend {
    fn drop(&mut self) {
        // Backstop for callers that never ran shutdown. kill_on_drop on the
        // Command covers the process itself; the tasks need an explicit stop.
        if let Ok(mut guard) = self.child.lock() {
            if let Some(child) = guard.as_mut() {
                let _ = child.start_kill();
            }
        }
        self.reader.abort();
        if let Some(logger) = &self.stderr_logger {
            logger.abort();
        }
    }
}

#[async_trait]
impl ToolBackend for StdioBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<BackendTool>> {
        let result = self.request("tools/list", None).await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| BackendError::Protocol("tools/list returned no tools".to_string()))?;
        Ok(serde_json::from_value(tools)?)
    }

    async fn call(&self, name: &str, arguments: Value) -> Result<CallResult> {
        let params = json!({
            "name": name,
            "arguments": arguments,
        });
        let result = self.request("tools/call", Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Read newline-delimited JSON-RPC responses from the child's stdout and
/// route each to the request waiting on its id.
async fn read_responses(
    server: String,
    stdout: tokio::process::ChildStdout,
    pending: PendingMap,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<JsonRpcResponse>(line) {
                    Ok(response) => {
                        let waiter = pending.lock().await.remove(&response.id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => {
                                warn!(server = %server, id = response.id, "response with no waiter");
                            }
                        }
                    }
                    Err(_) => {
                        // Server-initiated notifications land here too.
                        debug!(server = %server, "unhandled message: {}", line);
                    }
                }
            }
            Ok(None) => {
                debug!(server = %server, "backend stdout closed");
                break;
            }
            Err(e) => {
                error!(server = %server, "stdout read error: {}", e);
                break;
            }
        }
    }
    // Wake every in-flight request with Disconnected rather than leaving
    // them to time out.
    pending.lock().await.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_server_config() -> ServerConfig {
        // A shell loop that answers every request line with a canned
        // JSON-RPC response carrying the same id.
        let script = r#"
            while IFS= read -r line; do
                id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
                if [ -n "$id" ]; then
                    printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"echo","version":"0.0.1"}}}\n' "$id"
                fi
            done
        "#;
        ServerConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: HashMap::new(),
            cwd: None,
            request_timeout_ms: 5000,
        }
    }

    #[tokio::test]
    async fn initialize_round_trips_through_a_real_child_process() {
        let backend = StdioBackend::spawn("echo", &echo_server_config())
            .await
            .expect("spawn");
        let init = backend.initialize().await.expect("initialize");
        assert_eq!(init.server_info.name, "echo");
        backend.shutdown().await;
    }

    #[tokio::test]
    async fn spawn_failure_is_a_transport_error() {
        let config = ServerConfig {
            command: "/nonexistent/quill-test-binary".to_string(),
            args: vec![],
            env: HashMap::new(),
            cwd: None,
            request_timeout_ms: 1000,
        };
        assert!(matches!(
            StdioBackend::spawn("missing", &config).await,
            Err(BackendError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn requests_time_out_against_a_silent_server() {
        let config = ServerConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
            env: HashMap::new(),
            cwd: None,
            request_timeout_ms: 200,
        };
        let backend = StdioBackend::spawn("silent", &config).await.expect("spawn");
        assert!(matches!(
            backend.request("tools/list", None).await,
            Err(BackendError::Timeout(_))
        ));
        backend.shutdown().await;
    }
}
