//! Public API types for the in-process meta-scheduler engine.

use std::sync::Arc;
use std::time::Duration;

use metasched_core::QueueRecord;

use crate::adapter::{ClusterAdapter, ResourceHints};
use crate::report::{FinalStats, ReportSnapshot};
use crate::supervisor::SupervisorEvent;

/// Disables periodic status reporting.
pub const MONITOR_DISABLED: i64 = -1;

/// Configuration for the in-process engine.
pub struct EngineConfig {
    pub queues: Vec<QueueRecord>,
    /// Command lines, already read and trimmed by the CLI's stdin reader.
    pub commands: Vec<String>,
    pub adapter: Arc<dyn ClusterAdapter>,
    pub resource_hints: ResourceHints,
    pub poll_interval: Duration,
    /// Seconds between status lines; `-1` disables reporting, `0` reports
    /// every tick.
    pub monitor_interval_secs: i64,
    /// A command whose attempts (summed across every queue) exceed this
    /// bound is a fatal condition.
    pub retry_bound: u32,
}

/// Engine event stream payload. The CLI binary is solely responsible for
/// turning these into printed lines.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Started,
    StopRequested,
    Report(ReportSnapshot),
    Supervisor(SupervisorEvent),
    Stopped { result: EngineOutcome },
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum EngineOutcome {
    Completed(FinalStats),
    Cancelled(FinalStats),
    Fatal { reason: String },
}

/// Current engine state snapshot.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub stop_requested: bool,
    pub latest_report: Option<ReportSnapshot>,
}

/// Handle to a running in-process engine instance.
pub struct EngineHandle {
    pub(crate) inner: std::sync::Arc<crate::engine::EngineInner>,
    pub(crate) join: tokio::task::JoinHandle<Result<FinalStats, crate::error::EngineError>>,
}

/// Start a new in-process engine instance.
pub fn start_engine(config: EngineConfig) -> EngineHandle {
    crate::engine::start_engine(config)
}

impl EngineHandle {
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.snapshot_rx.borrow().clone()
    }

    /// Request a graceful shutdown: cancel every live job and stop.
    pub fn request_stop(&self) {
        self.inner.request_stop();
    }

    pub async fn wait(self) -> Result<FinalStats, crate::error::EngineError> {
        match self.join.await {
            Ok(res) => res,
            Err(err) => Err(crate::error::EngineError::Join(err.to_string())),
        }
    }
}
