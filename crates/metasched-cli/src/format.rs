use chrono::Local;
use metasched_engine::{FinalStats, ReportSnapshot, SupervisorEvent};

/// Locale-independent `%c`-equivalent local timestamp, used as every
/// emitted line's prefix.
fn timestamp() -> String {
    Local::now().format("%c").to_string()
}

pub fn start_banner(config_path: &str, poll_secs: u64, queue_count: usize) -> String {
    format!(
        "[{ts}] metasched {ver} starting: config={config_path} poll={poll_secs}s queues={queue_count}",
        ts = timestamp(),
        ver = env!("CARGO_PKG_VERSION"),
    )
}

pub fn load_report_line(report: &ReportSnapshot) -> String {
    let queues = report
        .queues
        .iter()
        .map(|q| format!("{}={}/{}", q.partition, q.current_load, q.ideal_jobs_ceil))
        .collect::<Vec<_>>()
        .join(" ");
    format!("[{ts}] load: {queues}", ts = timestamp())
}

pub fn progress_report_line(report: &ReportSnapshot) -> String {
    let pct = report.finished_fraction() * 100.0;
    format!(
        "[{ts}] progress: {finished}/{total} commands ({pct:.1}%)",
        ts = timestamp(),
        finished = report.finished_commands,
        total = report.total_commands,
    )
}

pub fn supervisor_event_line(event: &SupervisorEvent) -> String {
    let ts = timestamp();
    match event {
        SupervisorEvent::TransientQuery { job_id, queue } => {
            format!("[{ts}] warning: transient state query failure for job {job_id} on queue {queue}")
        }
        SupervisorEvent::Rerouted { job_id, from_queue } => {
            format!("[{ts}] rerouted job {job_id} away from queue {from_queue}")
        }
        SupervisorEvent::Retried { job_id, queue, commands } => {
            format!("[{ts}] job {job_id} on queue {queue} failed; {commands} command(s) returned to backlog")
        }
        SupervisorEvent::Preempted { job_id, queue, commands } => {
            format!("[{ts}] job {job_id} on queue {queue} was preempted; {commands} command(s) returned to backlog")
        }
        SupervisorEvent::Succeeded { job_id, queue, commands } => {
            format!("[{ts}] job {job_id} on queue {queue} completed; {commands} command(s) finished")
        }
        SupervisorEvent::UnknownState { job_id, queue } => {
            format!("[{ts}] warning: job {job_id} on queue {queue} reported an unrecognized state")
        }
    }
}

pub fn fatal_line(reason: &str) -> String {
    format!("[{ts}] fatal: {reason}", ts = timestamp())
}

pub fn termination_line() -> String {
    format!("[{ts}] terminated: cancelling live jobs", ts = timestamp())
}

pub fn completion_summary_line(stats: &FinalStats) -> String {
    let cpu = &stats.cpu_time;
    match (cpu.min_seconds, cpu.max_seconds, cpu.mean_seconds()) {
        (Some(min), Some(max), Some(mean)) => format!(
            "[{ts}] done: {finished} commands, cpu-time min={min:.1}s max={max:.1}s mean={mean:.1}s total={total:.1}s, wall={wall:.1}s",
            ts = timestamp(),
            finished = cpu.finished_count,
            total = cpu.total_seconds,
            wall = stats.wall_clock_seconds,
        ),
        _ => format!(
            "[{ts}] done: 0 commands completed, wall={wall:.1}s",
            ts = timestamp(),
            wall = stats.wall_clock_seconds,
        ),
    }
}
