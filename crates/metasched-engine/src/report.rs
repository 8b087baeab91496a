//! Data the Status Reporter needs. Nothing in this module formats text —
//! that's the CLI binary's job; this crate only hands over structured
//! numbers.

/// Running min/max/total of per-Command CPU time, in seconds, updated
/// only on successful job completion.
#[derive(Debug, Clone, Default)]
pub struct CpuTimeStats {
    pub min_seconds: Option<f64>,
    pub max_seconds: Option<f64>,
    pub total_seconds: f64,
    pub finished_count: u64,
}

impl CpuTimeStats {
    pub fn record(&mut self, per_command_seconds: f64, command_count: u64) {
        self.min_seconds = Some(match self.min_seconds {
            Some(m) => m.min(per_command_seconds),
            None => per_command_seconds,
        });
        self.max_seconds = Some(match self.max_seconds {
            Some(m) => m.max(per_command_seconds),
            None => per_command_seconds,
        });
        self.total_seconds += per_command_seconds * command_count as f64;
        self.finished_count += command_count;
    }

    pub fn mean_seconds(&self) -> Option<f64> {
        if self.finished_count == 0 {
            None
        } else {
            Some(self.total_seconds / self.finished_count as f64)
        }
    }
}

/// A single queue's row in a periodic status line.
#[derive(Debug, Clone)]
pub struct QueueReportRow {
    pub partition: String,
    pub current_load: u64,
    pub ideal_jobs_ceil: u64,
}

/// One periodic snapshot the Status Reporter may print.
#[derive(Debug, Clone)]
pub struct ReportSnapshot {
    pub queues: Vec<QueueReportRow>,
    pub finished_commands: u64,
    pub total_commands: u64,
}

impl ReportSnapshot {
    pub fn finished_fraction(&self) -> f64 {
        if self.total_commands == 0 {
            1.0
        } else {
            self.finished_commands as f64 / self.total_commands as f64
        }
    }
}

/// Emitted once at shutdown.
#[derive(Debug, Clone)]
pub struct FinalStats {
    pub cpu_time: CpuTimeStats,
    pub wall_clock_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_final_pack_divides_by_configured_pack_size_not_actual_count() {
        let mut stats = CpuTimeStats::default();
        let pack_size = 4;
        let job_cpu_time = 40.0;
        let actual_commands_in_pack = 2;
        stats.record(job_cpu_time / pack_size as f64, actual_commands_in_pack);

        assert_eq!(stats.finished_count, 2);
        assert!((stats.total_seconds - 20.0).abs() < 1e-9);
        assert!((stats.mean_seconds().unwrap() - 10.0).abs() < 1e-9);
    }
}
