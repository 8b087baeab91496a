//! The one module in this crate that shells out to a real cluster
//! scheduler. Every other module only ever sees the [`ClusterAdapter`]
//! trait, so swapping in a different batch scheduler means writing a new
//! file like this one, not touching the core.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command as ProcessCommand;

use crate::adapter::{ClusterAdapter, QueryResult, ResourceHints, StateTag, SubmissionFailure, TransientFailure};
use crate::domain::Command as SchedCommand;
use crate::queue::Queue;

/// The stderr text `sbatch` emits when its control socket to the
/// scheduler daemon is momentarily unreachable. Submissions failing with
/// exactly this message are retried rather than treated as fatal.
const SBATCH_SOCKET_TIMEOUT_MESSAGE: &str =
    "sbatch: error: Batch job submission failed: Socket timed out on send/recv operation";

/// Drives `sbatch`, `sacct`, and `scancel` as the concrete [`ClusterAdapter`]
/// for a Slurm cluster.
pub struct SlurmAdapter;

impl SlurmAdapter {
    pub fn new() -> Self {
        Self
    }

    fn script_for(commands: &[SchedCommand]) -> String {
        let mut script = String::from("#!/bin/sh\ncat <<'METASCHED_COMMANDS' | parallel -j0\n");
        for command in commands {
            script.push_str(&command.line);
            script.push('\n');
        }
        script.push_str("METASCHED_COMMANDS\n");
        script
    }
}

impl Default for SlurmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ClusterAdapter for SlurmAdapter {
    async fn submit(
        &self,
        queue: &Queue,
        commands: &[SchedCommand],
        hints: &ResourceHints,
    ) -> Result<String, SubmissionFailure> {
        let mut cmd = ProcessCommand::new("sbatch");
        cmd.arg("-A")
            .arg(&queue.account)
            .arg("-p")
            .arg(&queue.partition)
            .arg("-n")
            .arg("1")
            .arg("--no-requeue");

        if hints.memory_gb > 0 {
            let scaled = hints.memory_gb.saturating_mul(commands.len().max(1) as u32);
            cmd.arg("--mem").arg(format!("{scaled}G"));
        }
        if hints.timeout_minutes > 0 {
            cmd.arg("-t").arg(hints.timeout_minutes.to_string());
        }
        if let Some(qos) = &queue.qos {
            cmd.arg("--qos").arg(qos);
        }
        cmd.arg("-o")
            .arg(format!("{}/%j.out", hints.output_dir))
            .arg("-e")
            .arg(format!("{}/%j.err", hints.output_dir));

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SubmissionFailure::Fatal(format!("failed to spawn sbatch: {e}")))?;

        let script = Self::script_for(commands);
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .await
                .map_err(|e| SubmissionFailure::Fatal(format!("failed to write sbatch script: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SubmissionFailure::Fatal(format!("failed to wait for sbatch: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr == SBATCH_SOCKET_TIMEOUT_MESSAGE {
                return Err(SubmissionFailure::Transient(TransientFailure(stderr)));
            }
            return Err(SubmissionFailure::Fatal(stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            if let Some(rest) = line.trim().strip_prefix("Submitted batch job ") {
                return Ok(rest.trim().to_string());
            }
        }

        Err(SubmissionFailure::Fatal(format!(
            "sbatch did not report a job id: {stdout}"
        )))
    }

    async fn query_state(&self, job_id: &str) -> Result<QueryResult, TransientFailure> {
        let state_output = run("sacct", &["-j", job_id, "--noheader", "-o", "State%20"]).await?;
        let token = state_output.split_whitespace().next().unwrap_or("");
        let state = classify_state(token);

        let cpu_time_seconds = if state == StateTag::Succeeded {
            let cpu_output = run("sacct", &["-j", job_id, "--noheader", "-o", "CPUTimeRAW%20"]).await?;
            cpu_output.split_whitespace().next().and_then(|s| s.parse().ok())
        } else {
            None
        };

        Ok(QueryResult { state, cpu_time_seconds })
    }

    async fn cancel(&self, job_id: &str) -> Result<(), TransientFailure> {
        let _ = ProcessCommand::new("scancel")
            .arg(job_id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        Ok(())
    }
}

/// Maps Slurm's own state vocabulary onto the engine's closed [`StateTag`].
/// Any token this adapter doesn't recognize becomes `Unknown` rather than
/// an error, since `sacct` occasionally reports intermediate states.
fn classify_state(token: &str) -> StateTag {
    match token {
        "PENDING" => StateTag::Pending,
        "COMPLETING" | "CONFIGURING" | "RESIZING" | "RESV_DEL_HOLD" | "REQUEUE" | "REQUEUE_FED" | "REQUEUE_HOLD"
        | "REVOKED" | "RUNNING" | "SIGNALING" | "SPECIAL_EXIT" | "STOPPED" | "SUSPENDED" => StateTag::Running,
        "BOOT_FAIL" | "CANCELLED" | "DEADLINE" | "FAILED" | "NODE_FAIL" | "OUT_OF_MEMORY" | "TIMEOUT" => {
            StateTag::Failed
        }
        "PREEMPTED" => StateTag::Preempted,
        "COMPLETED" => StateTag::Succeeded,
        _ => StateTag::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_documented_state_tag() {
        assert_eq!(classify_state("PENDING"), StateTag::Pending);
        for running in [
            "COMPLETING",
            "CONFIGURING",
            "RESIZING",
            "RESV_DEL_HOLD",
            "REQUEUE",
            "REQUEUE_FED",
            "REQUEUE_HOLD",
            "REVOKED",
            "RUNNING",
            "SIGNALING",
            "SPECIAL_EXIT",
            "STOPPED",
            "SUSPENDED",
        ] {
            assert_eq!(classify_state(running), StateTag::Running, "{running}");
        }
        for failed in [
            "BOOT_FAIL",
            "CANCELLED",
            "DEADLINE",
            "FAILED",
            "NODE_FAIL",
            "OUT_OF_MEMORY",
            "TIMEOUT",
        ] {
            assert_eq!(classify_state(failed), StateTag::Failed, "{failed}");
        }
        assert_eq!(classify_state("PREEMPTED"), StateTag::Preempted);
        assert_eq!(classify_state("COMPLETED"), StateTag::Succeeded);
        assert_eq!(classify_state("SOME_FUTURE_STATE"), StateTag::Unknown);
    }
}

/// Runs a read-only accounting command, treating any nonzero exit or
/// non-UTF-8 output as transient: `sacct`'s backing database is known to
/// be intermittently unavailable even on a healthy cluster.
async fn run(program: &str, args: &[&str]) -> Result<String, TransientFailure> {
    let output = ProcessCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| TransientFailure(format!("failed to spawn {program}: {e}")))?;

    if !output.status.success() {
        return Err(TransientFailure(format!(
            "{program} exited with {status}",
            status = output.status
        )));
    }

    String::from_utf8(output.stdout).map_err(|_| TransientFailure(format!("{program} output was not UTF-8")))
}
