//! Child-process execution for agent CLIs.

use super::{Agent, AgentInvoker};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct AgentOutput {
    /// stdout followed by stderr
    pub raw: String,
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

/// A live agent process. Dropping it kills the child.
pub struct RunningAgent {
    pub name: String,
    pub prompt: String,
    pub started_at: Instant,
    child: Child,
}

/// Spawn the agent CLI and hand it the prompt.
pub fn spawn(agent: &Agent, prompt: &str) -> Result<RunningAgent, ProviderError> {
    let invocation = agent.build_invocation(prompt);

    // Use string for PATH lookup if not an absolute/relative path
    let binary_str = invocation.program.to_string_lossy();
    let mut cmd = if binary_str.contains('/') || binary_str.contains('\\') {
        Command::new(&invocation.program)
    } else {
        Command::new(binary_str.as_ref())
    };

    cmd.args(&invocation.args)
        .stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(
        "Spawning {} ({}): {} {} args",
        agent.name(),
        agent.kind(),
        binary_str,
        invocation.args.len()
    );

    let mut child = cmd.spawn()?;

    if let Some(input) = invocation.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            // Written from a task so a child that reads lazily cannot stall collection
            let name = agent.name().to_string();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!("Agent {} closed stdin early: {}", name, e);
                }
                let _ = stdin.shutdown().await;
            });
        }
    }

    Ok(RunningAgent {
        name: agent.name().to_string(),
        prompt: prompt.to_string(),
        started_at: Instant::now(),
        child,
    })
}

/// Wait for the agent to finish. On timeout the child is killed and its
/// partial output discarded.
pub async fn collect(
    handle: RunningAgent,
    timeout: Duration,
) -> Result<AgentOutput, ProviderError> {
    let RunningAgent {
        name,
        started_at,
        child,
        ..
    } = handle;

    let output = match tokio_timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            // The child was moved into the dropped future; kill_on_drop reaps it
            warn!("Agent {} timed out after {:?}, killed", name, timeout);
            return Err(ProviderError::Timeout(timeout));
        }
    };

    let mut raw = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !raw.is_empty() && !raw.ends_with('\n') {
            raw.push('\n');
        }
        raw.push_str(&stderr);
    }

    if !output.status.success() {
        warn!(
            "Agent {} exited with {:?}; output is still validated",
            name,
            output.status.code()
        );
    }

    Ok(AgentOutput {
        raw,
        exit_code: output.status.code(),
        duration: started_at.elapsed(),
    })
}

/// Invoker backed by real child processes.
///
/// Refuses to start a second process for an agent name that is already live.
#[derive(Default)]
pub struct ProcessInvoker {
    live: Arc<Mutex<HashSet<String>>>,
}

struct LiveGuard {
    live: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.remove(&self.name);
    }
}

impl ProcessInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, name: &str) -> Result<LiveGuard, ProviderError> {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        if !live.insert(name.to_string()) {
            return Err(ProviderError::AlreadyRunning(name.to_string()));
        }
        Ok(LiveGuard {
            live: self.live.clone(),
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl AgentInvoker for ProcessInvoker {
    async fn invoke(
        &self,
        agent: &Agent,
        prompt: &str,
        timeout: Duration,
    ) -> Result<AgentOutput, ProviderError> {
        let _guard = self.claim(agent.name())?;
        let handle = spawn(agent, prompt)?;
        collect(handle, timeout).await
    }
}
