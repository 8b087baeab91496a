use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, watch};

use crate::api::{EngineConfig, EngineEvent, EngineHandle, EngineOutcome, StatusSnapshot, MONITOR_DISABLED};
use crate::domain::Command;
use crate::error::EngineError;
use crate::queue::{Queue, QueueTable};
use crate::registry::Registry;
use crate::report::{CpuTimeStats, FinalStats, QueueReportRow, ReportSnapshot};
use crate::router::Router;
use crate::submission::SubmissionLoop;
use crate::supervisor::LifecycleSupervisor;

pub(crate) struct EngineInner {
    pub(crate) event_tx: broadcast::Sender<EngineEvent>,
    pub(crate) snapshot_rx: watch::Receiver<StatusSnapshot>,
    stop_requested: AtomicBool,
    notify: tokio::sync::Notify,
}

impl EngineInner {
    pub(crate) fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            let _ = self.event_tx.send(EngineEvent::StopRequested);
            self.notify.notify_waiters();
        }
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

struct EngineRuntime {
    cfg: EngineConfig,
    queues: QueueTable,
    registry: Registry,
    cpu_time: CpuTimeStats,
    started_at: Instant,
    last_report_at: Option<Instant>,
    snapshot_tx: watch::Sender<StatusSnapshot>,
    inner: Arc<EngineInner>,
}

impl EngineRuntime {
    fn emit(&self, event: EngineEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    fn build_report(&self) -> ReportSnapshot {
        let queues = self
            .queues
            .list_all()
            .iter()
            .map(|q| QueueReportRow {
                partition: q.partition.clone(),
                current_load: q.current_load as u64,
                ideal_jobs_ceil: q.ideal_jobs_ceil(),
            })
            .collect();

        ReportSnapshot {
            queues,
            finished_commands: self.cpu_time.finished_count,
            total_commands: self.registry.total_unfinished() as u64 + self.cpu_time.finished_count,
        }
    }

    fn push_snapshot(&self, latest_report: Option<ReportSnapshot>) {
        let snapshot = StatusSnapshot {
            stop_requested: self.inner.should_stop(),
            latest_report,
        };
        let _ = self.snapshot_tx.send(snapshot);
    }

    /// Reports on a schedule: every tick when `monitor_interval_secs == 0`,
    /// never when it's `MONITOR_DISABLED`, otherwise once the configured
    /// number of seconds has elapsed since the previous report.
    fn maybe_report(&mut self) {
        if self.cfg.monitor_interval_secs == MONITOR_DISABLED {
            return;
        }
        let due = match self.last_report_at {
            None => true,
            Some(last) => last.elapsed() >= Duration::from_secs(self.cfg.monitor_interval_secs.max(0) as u64),
        };
        if !due {
            return;
        }
        self.last_report_at = Some(Instant::now());
        let report = self.build_report();
        self.push_snapshot(Some(report.clone()));
        self.emit(EngineEvent::Report(report));
    }

    async fn cancel_all_live_jobs(&self) {
        for job in self.registry.live_jobs() {
            let _ = self.cfg.adapter.cancel(&job.id).await;
        }
    }

    fn final_stats(&self) -> FinalStats {
        FinalStats {
            cpu_time: self.cpu_time.clone(),
            wall_clock_seconds: self.started_at.elapsed().as_secs_f64(),
        }
    }

    async fn run(mut self) -> Result<FinalStats, EngineError> {
        self.emit(EngineEvent::Started);
        self.push_snapshot(None);

        let outcome = self.run_loop().await;

        self.cancel_all_live_jobs().await;

        let result = match outcome {
            Ok(()) => {
                let stats = self.final_stats();
                self.emit(EngineEvent::Stopped { result: EngineOutcome::Completed(stats.clone()) });
                Ok(stats)
            }
            Err(RunLoopExit::Cancelled) => {
                let stats = self.final_stats();
                self.emit(EngineEvent::Stopped { result: EngineOutcome::Cancelled(stats.clone()) });
                Ok(stats)
            }
            Err(RunLoopExit::Fatal(err)) => {
                self.emit(EngineEvent::Stopped { result: EngineOutcome::Fatal { reason: err.to_string() } });
                Err(err)
            }
        };

        self.push_snapshot(None);
        result
    }

    async fn run_loop(&mut self) -> Result<(), RunLoopExit> {
        loop {
            if self.inner.should_stop() {
                return Err(RunLoopExit::Cancelled);
            }
            if self.registry.total_unfinished() == 0 {
                return Ok(());
            }

            let now = Utc::now();
            let order = Router::recompute(&mut self.queues, &self.registry, now);

            if let Err(fatal) =
                SubmissionLoop::run(&order, &mut self.queues, &mut self.registry, self.cfg.adapter.as_ref(), &self.cfg.resource_hints)
                    .await
            {
                return Err(RunLoopExit::Fatal(fatal.into()));
            }

            self.maybe_report();

            tokio::select! {
                _ = tokio::time::sleep(self.cfg.poll_interval) => {}
                _ = self.inner.notify.notified() => {}
            }

            if self.inner.should_stop() {
                return Err(RunLoopExit::Cancelled);
            }

            match LifecycleSupervisor::run(
                &order,
                &mut self.queues,
                &mut self.registry,
                self.cfg.adapter.as_ref(),
                self.cfg.retry_bound,
                &mut self.cpu_time,
                now,
            )
            .await
            {
                Ok(events) => {
                    for event in events {
                        self.emit(EngineEvent::Supervisor(event));
                    }
                }
                Err(fatal) => return Err(RunLoopExit::Fatal(fatal.into())),
            }
        }
    }
}

enum RunLoopExit {
    Cancelled,
    Fatal(EngineError),
}

pub(crate) fn start_engine(cfg: EngineConfig) -> EngineHandle {
    let (event_tx, _) = broadcast::channel::<EngineEvent>(1024);
    let (snapshot_tx, snapshot_rx) = watch::channel(StatusSnapshot { stop_requested: false, latest_report: None });

    let inner = Arc::new(EngineInner {
        event_tx,
        snapshot_rx,
        stop_requested: AtomicBool::new(false),
        notify: tokio::sync::Notify::new(),
    });

    let queues: Vec<Queue> = cfg.queues.iter().map(Queue::from_record).collect();
    let queue_ids: Vec<String> = queues.iter().map(|q| q.partition.clone()).collect();

    let mut registry = Registry::default();
    registry.append_commands(
        cfg.commands
            .iter()
            .map(|line| Command::new(line.clone(), queue_ids.clone())),
    );

    let runtime = EngineRuntime {
        cfg,
        queues: QueueTable::new(queues),
        registry,
        cpu_time: CpuTimeStats::default(),
        started_at: Instant::now(),
        last_report_at: None,
        snapshot_tx,
        inner: inner.clone(),
    };

    let join = tokio::spawn(runtime.run());
    EngineHandle { inner, join }
}
