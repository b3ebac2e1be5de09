//! Thin wrapper around the `limactl` binary.

use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::Deserialize;
use wait_timeout::ChildExt;

use crate::provider::ProviderError;

/// Lima instance information from `limactl list --json`.
#[derive(Debug, Deserialize)]
pub struct LimaInstanceInfo {
    pub name: String,
    pub status: String,
}

impl LimaInstanceInfo {
    pub fn is_running(&self) -> bool {
        self.status == "Running"
    }
}

/// Parse NDJSON output from `limactl list --json` (one JSON object per line).
pub fn parse_lima_instances(stdout: &[u8]) -> anyhow::Result<Vec<LimaInstanceInfo>> {
    std::str::from_utf8(stdout)?
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            serde_json::from_str::<LimaInstanceInfo>(l)
                .with_context(|| format!("Failed to parse limactl row: {}", l))
        })
        .collect()
}

/// Whether limactl's stderr says instance `id` itself does not exist.
///
/// Only limactl's own messages name the instance in quotes, so errors printed
/// by commands running inside the guest never match.
pub fn is_missing_instance(stderr: &str, id: &str) -> bool {
    let quoted = format!("instance \"{id}\"");
    let escaped = format!("instance \\\"{id}\\\"");
    stderr.lines().any(|line| {
        let lower = line.to_ascii_lowercase();
        (line.contains(&quoted) || line.contains(&escaped))
            && (lower.contains("not found")
                || lower.contains("does not exist")
                || lower.contains("non-existent"))
    })
}

fn drain(mut pipe: impl Read + Send + 'static) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

/// Run limactl, killing it if it outlives `timeout`.
///
/// The exit status is not checked; see [`check_output`] and [`check_instance_output`].
pub fn run_limactl(args: &[&str], timeout: Duration) -> Result<Output, ProviderError> {
    tracing::debug!("executing limactl command: limactl {}", args.join(" "));

    let mut child = Command::new("limactl")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to execute limactl command")?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match child
        .wait_timeout(timeout)
        .context("failed to wait for limactl")?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!(
                "limactl command timed out after {} seconds: limactl {}",
                timeout.as_secs(),
                args.join(" ")
            );
            return Err(ProviderError::Timeout {
                operation: format!("limactl {}", args.join(" ")),
                timeout,
            });
        }
    };

    let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
    let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();

    if !stdout.is_empty() {
        tracing::debug!("limactl stdout: {}", String::from_utf8_lossy(&stdout).trim());
    }
    if !stderr.is_empty() {
        let text = String::from_utf8_lossy(&stderr);
        if status.success() {
            tracing::debug!("limactl stderr: {}", text.trim());
        } else {
            tracing::info!("limactl stderr: {}", text.trim());
        }
    }

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

/// Turn a failed limactl invocation into an error.
pub fn check_output(output: Output) -> Result<Output, ProviderError> {
    if output.status.success() {
        return Ok(output);
    }
    Err(ProviderError::Command(anyhow!(
        "limactl command failed: {}",
        String::from_utf8_lossy(&output.stderr).trim()
    )))
}

/// Like [`check_output`] for calls that manage instance `id` itself, mapping
/// limactl's "no such instance" report to [`ProviderError::NotFound`].
pub fn check_instance_output(output: Output, id: &str) -> Result<Output, ProviderError> {
    if !output.status.success() && is_missing_instance(&String::from_utf8_lossy(&output.stderr), id)
    {
        return Err(ProviderError::NotFound { id: id.to_string() });
    }
    check_output(output)
}
