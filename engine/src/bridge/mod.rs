//! Automation bridge
//!
//! The browser automation and the vision judge run in an external process
//! that speaks JSON lines on stdio. Each request is one line:
//!
//! ```text
//! {"id": 7, "op": "run_task", "params": {"instruction": "...", "max_steps": 25}}
//! ```
//!
//! and each response echoes the id:
//!
//! ```text
//! {"id": 7, "ok": true, "data": {"success": true, "result": "..."}}
//! {"id": 7, "ok": false, "error": {"kind": "disconnected", "message": "..."}}
//! ```
//!
//! Failures are classified into [`ActuatorErrorKind`] here, once, so the
//! controllers only ever branch on typed outcomes. A closed pipe means the
//! session is gone; a timeout is transient.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::actuator::{Actuator, ActuatorError, ScreenEvent, TaskOutcome};
use sdk::errors::EngineError;
use sdk::judge::{Judge, JudgeContext, JudgeVerdict};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::actuator::parse_credit_reading;
use crate::config::ActuatorConfig;
use crate::production::quality::{parse_verdict, verdict_from_value};

#[derive(Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    op: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<ActuatorError>,
}

impl BridgeResponse {
    fn into_result(self) -> Result<Value, ActuatorError> {
        if self.ok {
            Ok(self.data)
        } else {
            Err(self
                .error
                .unwrap_or_else(|| ActuatorError::fatal("bridge reported failure without details")))
        }
    }
}

struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// A running bridge process
pub struct Bridge {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    process: Mutex<Option<BridgeProcess>>,
    connected: AtomicBool,
    next_id: AtomicU64,
}

impl Bridge {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
            process: Mutex::new(None),
            connected: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &ActuatorConfig) -> Self {
        Self::new(
            config.bridge_command.clone(),
            config.bridge_args.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Spawn the bridge process, replacing any previous one
    pub async fn start(&self) -> Result<()> {
        let mut guard = self.process.lock().await;
        if let Some(mut old) = guard.take() {
            if let Err(e) = old.child.kill().await {
                debug!("Old bridge process already gone: {}", e);
            }
        }

        info!("Starting automation bridge: {} {}", self.command, self.args.join(" "));
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start bridge '{}'", self.command))?;

        let stdin = child.stdin.take().context("Bridge stdin unavailable")?;
        let stdout = child.stdout.take().context("Bridge stdout unavailable")?;

        *guard = Some(BridgeProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        });
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stop the bridge process
    pub async fn shutdown(&self) {
        if let Some(mut process) = self.process.lock().await.take() {
            if let Err(e) = process.child.kill().await {
                debug!("Bridge process already gone: {}", e);
            }
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Send one request and wait for its response
    pub async fn call(&self, op: &str, params: Value) -> Result<Value, ActuatorError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut line = serde_json::to_string(&BridgeRequest { id, op, params })
            .map_err(|e| ActuatorError::fatal(format!("could not encode request: {}", e)))?;
        line.push('\n');

        let mut guard = self.process.lock().await;
        let Some(process) = guard.as_mut() else {
            self.connected.store(false, Ordering::SeqCst);
            return Err(ActuatorError::disconnected("bridge is not running"));
        };

        debug!(id, op, "Bridge request");
        if let Err(e) = write_line(&mut process.stdin, &line).await {
            return Err(self.lost(format!("write failed: {}", e)));
        }

        let read = tokio::time::timeout(self.timeout, async {
            loop {
                match process.stdout.next_line().await {
                    Ok(Some(text)) => match serde_json::from_str::<BridgeResponse>(&text) {
                        Ok(response) if response.id == id => return Ok(response),
                        Ok(response) => {
                            debug!("Skipping stale bridge response {}", response.id);
                        }
                        Err(e) => warn!("Ignoring malformed bridge line ({}): {}", e, text),
                    },
                    Ok(None) => return Err("bridge closed its output".to_string()),
                    Err(e) => return Err(format!("read failed: {}", e)),
                }
            }
        })
        .await;

        match read {
            Ok(Ok(response)) => response.into_result().map_err(|e| {
                if e.kind == sdk::actuator::ActuatorErrorKind::Disconnected {
                    self.connected.store(false, Ordering::SeqCst);
                }
                e
            }),
            Ok(Err(reason)) => Err(self.lost(reason)),
            Err(_) => {
                warn!(op, "Bridge request timed out after {:?}", self.timeout);
                Err(ActuatorError::transient(format!(
                    "{} timed out after {}s",
                    op,
                    self.timeout.as_secs()
                )))
            }
        }
    }

    fn lost(&self, reason: String) -> ActuatorError {
        warn!("Bridge connection lost: {}", reason);
        self.connected.store(false, Ordering::SeqCst);
        ActuatorError::disconnected(reason)
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

fn path_field(data: &Value) -> Option<PathBuf> {
    data.get("path")
        .and_then(Value::as_str)
        .or_else(|| data.as_str())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

/// Balance from a bridge reading: a number, or text such as "1,250 credits"
fn balance_from_value(data: &Value) -> Option<i64> {
    let value = data.get("balance").unwrap_or(data);
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(text) => parse_credit_reading(text),
        _ => None,
    }
}

fn task_outcome_from_value(data: Value) -> TaskOutcome {
    match data {
        Value::String(text) => TaskOutcome::ok(text),
        other => serde_json::from_value(other).unwrap_or_else(|e| {
            TaskOutcome::failed(ActuatorError::fatal(format!("malformed task outcome: {}", e)))
        }),
    }
}

/// [`Actuator`] backed by the bridge
pub struct BridgeActuator {
    bridge: Arc<Bridge>,
}

impl BridgeActuator {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Actuator for BridgeActuator {
    async fn run_task(&self, instruction: &str, max_steps: u32) -> TaskOutcome {
        match self
            .bridge
            .call(
                "run_task",
                json!({ "instruction": instruction, "max_steps": max_steps }),
            )
            .await
        {
            Ok(data) => task_outcome_from_value(data),
            Err(error) => TaskOutcome::failed(error),
        }
    }

    async fn take_screenshot(&self, name: &str) -> Option<PathBuf> {
        match self.bridge.call("screenshot", json!({ "name": name })).await {
            Ok(data) => path_field(&data),
            Err(e) => {
                debug!("Screenshot {} failed: {}", name, e);
                None
            }
        }
    }

    async fn credit_balance(&self) -> Option<i64> {
        match self.bridge.call("credit_balance", Value::Null).await {
            Ok(data) => balance_from_value(&data),
            Err(e) => {
                warn!("Credit balance unreadable: {}", e);
                None
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.bridge.is_connected()
    }

    async fn restart(&self) -> bool {
        if let Err(e) = self.bridge.start().await {
            warn!("Bridge restart failed: {:#}", e);
            return false;
        }
        match self.bridge.call("verify_login", Value::Null).await {
            Ok(data) => data
                .get("logged_in")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            Err(e) => {
                warn!("Login check after restart failed: {}", e);
                false
            }
        }
    }

    async fn observe(&self) -> ScreenEvent {
        match self.bridge.call("observe", Value::Null).await {
            Ok(data) => serde_json::from_value(data).unwrap_or_else(|e| {
                warn!("Unreadable screen event: {}", e);
                ScreenEvent::NoAction
            }),
            Err(e) => {
                warn!("Screen observation failed: {}", e);
                ScreenEvent::NoAction
            }
        }
    }

    async fn export_artifact(&self, filename: &str) -> Option<PathBuf> {
        match self.bridge.call("export", json!({ "filename": filename })).await {
            Ok(data) => path_field(&data),
            Err(e) => {
                warn!("Export of {} failed: {}", filename, e);
                None
            }
        }
    }
}

/// [`Judge`] backed by the bridge's vision model
pub struct BridgeJudge {
    bridge: Arc<Bridge>,
}

impl BridgeJudge {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Judge for BridgeJudge {
    async fn score(
        &self,
        artifact: &Path,
        reference_script: &str,
        context: &JudgeContext,
    ) -> Result<JudgeVerdict, EngineError> {
        let data = self
            .bridge
            .call(
                "judge",
                json!({
                    "artifact": artifact.to_string_lossy(),
                    "reference_script": reference_script,
                    "context": context,
                }),
            )
            .await
            .map_err(|e| EngineError::Judge(e.to_string()))?;

        match &data {
            Value::String(text) => parse_verdict(text),
            other => verdict_from_value(other),
        }
    }
}
