use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{oneshot, Mutex};

/// One request/response round-trip against the media worker subprocess.
/// Method names mirror the capability surface in §6: `create-router`,
/// `create-transport-on-router`, `connect-transport`,
/// `create-producer-on-transport`, `create-consumer-on-transport`,
/// `pause-producer`/`resume-producer`, `pause-consumer`/`resume-consumer`,
/// `close-X`, `observe-active-speaker-on-router`.
#[derive(Debug, Serialize)]
struct RpcRequest {
    id: u64,
    method: &'static str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Out-of-band notification from the worker that doesn't correlate to a
/// pending request (the active-speaker observer stream, and the worker's
/// own unsolicited exit notice handled by the process-exit path instead).
#[derive(Debug, Clone, Deserialize)]
pub struct RpcNotification {
    pub method: String,
    pub params: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker process error: {0}")]
    Process(String),
    #[error("worker returned error: {0}")]
    Remote(String),
    #[error("worker connection closed")]
    Closed,
}

struct Pending {
    inflight: Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>,
}

/// A single long-lived OS subprocess running the media-forwarding code,
/// speaking line-delimited JSON-RPC over stdin/stdout. The server never
/// parses the forwarder's internals — only this envelope.
pub struct Worker {
    pub id: u64,
    pub pid: u32,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: Arc<Pending>,
    next_request_id: AtomicU64,
    router_count: AtomicU64,
    pub notifications: tokio::sync::broadcast::Sender<RpcNotification>,
}

impl Worker {
    pub async fn spawn(id: u64, binary_path: &str) -> Result<Self, WorkerError> {
        let mut child = tokio::process::Command::new(binary_path)
            .arg("--worker-id")
            .arg(id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::Process(e.to_string()))?;

        let pid = child.id().unwrap_or(0);
        let stdin = child.stdin.take().ok_or_else(|| WorkerError::Process("no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| WorkerError::Process("no stdout".into()))?;

        let pending = Arc::new(Pending {
            inflight: Mutex::new(HashMap::new()),
        });
        let (notify_tx, _) = tokio::sync::broadcast::channel(1024);

        let reader_pending = pending.clone();
        let reader_notify = notify_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Ok(resp) = serde_json::from_str::<RpcResponse>(&line) {
                            let mut inflight = reader_pending.inflight.lock().await;
                            if let Some(sender) = inflight.remove(&resp.id) {
                                let outcome = match resp.error {
                                    Some(err) => Err(err),
                                    None => Ok(resp.result.unwrap_or(Value::Null)),
                                };
                                let _ = sender.send(outcome);
                            }
                            continue;
                        }
                        if let Ok(note) = serde_json::from_str::<RpcNotification>(&line) {
                            let _ = reader_notify.send(note);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "worker stdout read error");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            id,
            pid,
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            next_request_id: AtomicU64::new(1),
            router_count: AtomicU64::new(0),
            notifications: notify_tx,
        })
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value, WorkerError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut inflight = self.pending.inflight.lock().await;
            inflight.insert(request_id, tx);
        }

        let request = RpcRequest {
            id: request_id,
            method,
            params,
        };
        let mut line = serde_json::to_vec(&request).map_err(|e| WorkerError::Process(e.to_string()))?;
        line.push(b'\n');

        {
            let mut stdin = self.stdin.lock().await;
            stdin
                .write_all(&line)
                .await
                .map_err(|e| WorkerError::Process(e.to_string()))?;
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(remote)) => Err(WorkerError::Remote(remote)),
            Err(_) => Err(WorkerError::Closed),
        }
    }

    pub async fn create_router(&self, room_id: &str) -> Result<Value, WorkerError> {
        let result = self.call("create-router", serde_json::json!({ "roomId": room_id })).await?;
        self.router_count.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }

    pub async fn close_router(&self, router_id: &str) -> Result<(), WorkerError> {
        self.call("close-router", serde_json::json!({ "routerId": router_id })).await?;
        self.router_count.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn create_transport(&self, router_id: &str, role: &str) -> Result<Value, WorkerError> {
        self.call(
            "create-transport-on-router",
            serde_json::json!({ "routerId": router_id, "role": role }),
        )
        .await
    }

    pub async fn connect_transport(&self, transport_id: &str, dtls_parameters: Value) -> Result<(), WorkerError> {
        self.call(
            "connect-transport",
            serde_json::json!({ "transportId": transport_id, "dtlsParameters": dtls_parameters }),
        )
        .await?;
        Ok(())
    }

    pub async fn create_producer(
        &self,
        transport_id: &str,
        kind: &str,
        rtp_parameters: Value,
    ) -> Result<Value, WorkerError> {
        self.call(
            "create-producer-on-transport",
            serde_json::json!({ "transportId": transport_id, "kind": kind, "rtpParameters": rtp_parameters }),
        )
        .await
    }

    pub async fn create_consumer(
        &self,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: Value,
    ) -> Result<Value, WorkerError> {
        self.call(
            "create-consumer-on-transport",
            serde_json::json!({
                "transportId": transport_id,
                "producerId": producer_id,
                "rtpCapabilities": rtp_capabilities,
            }),
        )
        .await
    }

    pub async fn pause_producer(&self, producer_id: &str) -> Result<(), WorkerError> {
        self.call("pause-producer", serde_json::json!({ "producerId": producer_id })).await?;
        Ok(())
    }

    pub async fn resume_producer(&self, producer_id: &str) -> Result<(), WorkerError> {
        self.call("resume-producer", serde_json::json!({ "producerId": producer_id })).await?;
        Ok(())
    }

    pub async fn resume_consumer(&self, consumer_id: &str) -> Result<(), WorkerError> {
        self.call("resume-consumer", serde_json::json!({ "consumerId": consumer_id })).await?;
        Ok(())
    }

    pub async fn close_producer(&self, producer_id: &str) -> Result<(), WorkerError> {
        self.call("close-producer", serde_json::json!({ "producerId": producer_id })).await?;
        Ok(())
    }

    pub async fn close_consumer(&self, consumer_id: &str) -> Result<(), WorkerError> {
        self.call("close-consumer", serde_json::json!({ "consumerId": consumer_id })).await?;
        Ok(())
    }

    pub async fn close_transport(&self, transport_id: &str) -> Result<(), WorkerError> {
        self.call("close-transport", serde_json::json!({ "transportId": transport_id })).await?;
        Ok(())
    }

    pub async fn observe_active_speaker(&self, router_id: &str) -> Result<(), WorkerError> {
        self.call(
            "observe-active-speaker-on-router",
            serde_json::json!({ "routerId": router_id }),
        )
        .await?;
        Ok(())
    }

    pub fn router_count(&self) -> u64 {
        self.router_count.load(Ordering::Relaxed)
    }

    pub async fn is_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }

    pub async fn wait(&self) -> std::io::Result<std::process::ExitStatus> {
        let mut child = self.child.lock().await;
        child.wait().await
    }
}

/// Tracks a worker's crash/restart history for the backoff policy: initial
/// 1s, doubling, capped at a configured maximum.
pub struct RestartState {
    pub restart_count: u32,
    pub last_restart_attempt: Option<Instant>,
}

impl RestartState {
    pub fn new() -> Self {
        Self {
            restart_count: 0,
            last_restart_attempt: None,
        }
    }

    pub fn next_backoff(&self, cap: Duration) -> Duration {
        let secs = 1u64.checked_shl(self.restart_count.min(16)).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(cap)
    }
}

impl Default for RestartState {
    fn default() -> Self {
        Self::new()
    }
}
