use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use metasched_core::QueueRecord;

/// A cluster partition: static config plus the dynamic state the Router
/// and Supervisor update every tick.
#[derive(Debug, Clone)]
pub struct Queue {
    pub partition: String,
    pub account: String,
    pub commands_per_job: usize,
    pub max_jobs: usize,
    pub qos: Option<String>,

    pub current_load: usize,
    completions: VecDeque<DateTime<Utc>>,

    /// `1 + recent_completions_24h`, recomputed each Router pass.
    pub score: f64,
    /// Target concurrent job count this tick, after scoring and spill.
    pub ideal_jobs: f64,
}

impl Queue {
    pub fn from_record(record: &QueueRecord) -> Self {
        Self {
            partition: record.partition.clone(),
            account: record.account.clone(),
            commands_per_job: record.commands_per_job as usize,
            max_jobs: record.max_jobs as usize,
            qos: record.qos.clone(),
            current_load: 0,
            completions: VecDeque::new(),
            score: 1.0,
            ideal_jobs: 0.0,
        }
    }

    pub fn record_completions(&mut self, n: usize, at: DateTime<Utc>) {
        for _ in 0..n {
            self.completions.push_back(at);
        }
    }

    /// Drops completions older than `now - 24h`.
    pub fn prune_completions(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(24);
        while matches!(self.completions.front(), Some(t) if *t < cutoff) {
            self.completions.pop_front();
        }
    }

    pub fn recent_completions(&self) -> usize {
        self.completions.len()
    }

    pub fn ideal_jobs_ceil(&self) -> u64 {
        self.ideal_jobs.ceil().max(0.0) as u64
    }
}

/// Owns every `Queue`, in configuration order. Configuration order is the
/// tie-break for Router output and the processing order for the spill pass.
pub struct QueueTable {
    queues: Vec<Queue>,
}

impl QueueTable {
    pub fn new(queues: Vec<Queue>) -> Self {
        Self { queues }
    }

    pub fn list_all(&self) -> &[Queue] {
        &self.queues
    }

    pub fn list_all_mut(&mut self) -> &mut [Queue] {
        &mut self.queues
    }

    pub fn lookup(&self, partition: &str) -> Option<&Queue> {
        self.queues.iter().find(|q| q.partition == partition)
    }

    pub fn lookup_mut(&mut self, partition: &str) -> Option<&mut Queue> {
        self.queues.iter_mut().find(|q| q.partition == partition)
    }

    pub fn index_of(&self, partition: &str) -> Option<usize> {
        self.queues.iter().position(|q| q.partition == partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metasched_core::QueueRecord;

    fn record() -> QueueRecord {
        QueueRecord {
            partition: "q0".into(),
            account: "acct".into(),
            commands_per_job: 1,
            max_jobs: 1,
            qos: None,
        }
    }

    #[test]
    fn prune_drops_only_completions_older_than_24h() {
        let mut queue = Queue::from_record(&record());
        let now = Utc::now();
        queue.record_completions(2, now - Duration::hours(25));
        queue.record_completions(3, now - Duration::hours(1));

        queue.prune_completions(now);
        assert_eq!(queue.recent_completions(), 3);
    }

    #[test]
    fn ideal_jobs_ceil_rounds_up_for_display() {
        let mut queue = Queue::from_record(&record());
        queue.ideal_jobs = 2.1;
        assert_eq!(queue.ideal_jobs_ceil(), 3);
    }
}
