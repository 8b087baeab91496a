use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::adapter::{ClusterAdapter, StateTag};
use crate::queue::QueueTable;
use crate::registry::Registry;
use crate::report::CpuTimeStats;

/// A Command whose total attempts (summed across every queue it has been
/// tried against) exceeded the configured retry bound. The caller must
/// cancel every remaining live job and exit non-zero.
#[derive(Debug, Error)]
#[error("command `{command_line}` exceeded the retry bound ({total_attempts} > {retry_bound})")]
pub struct FatalRetryLimit {
    pub command_line: String,
    pub total_attempts: u32,
    pub retry_bound: u32,
}

/// Per-job outcomes the Status Reporter / CLI may want to log. Deliberately
/// data-only: this crate never prints anything itself.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    TransientQuery { job_id: String, queue: String },
    Rerouted { job_id: String, from_queue: String },
    Retried { job_id: String, queue: String, commands: usize },
    Preempted { job_id: String, queue: String, commands: usize },
    Succeeded { job_id: String, queue: String, commands: usize },
    UnknownState { job_id: String, queue: String },
}

impl SupervisorEvent {
    /// True for the two classes §7 treats as warnings rather than ordinary
    /// progress lines: transient query failures and unrecognized state
    /// tags. Callers route these to stderr instead of stdout.
    pub fn is_warning(&self) -> bool {
        matches!(self, SupervisorEvent::TransientQuery { .. } | SupervisorEvent::UnknownState { .. })
    }
}

/// Classifies every live Job once per poll interval and applies the
/// corresponding state transition: re-routing a still-pending Job toward
/// a more contested queue, retrying or dropping a finished one, or
/// recording a completion's CPU-time contribution.
pub struct LifecycleSupervisor;

impl LifecycleSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        router_order: &[usize],
        queues: &mut QueueTable,
        registry: &mut Registry,
        adapter: &dyn ClusterAdapter,
        retry_bound: u32,
        cpu_time: &mut CpuTimeStats,
        now: DateTime<Utc>,
    ) -> Result<Vec<SupervisorEvent>, FatalRetryLimit> {
        let mut events = Vec::new();
        let mut i = 0;

        while i < registry.live_jobs.len() {
            let job_id = registry.live_jobs[i].id.clone();
            let queue_name = registry.live_jobs[i].queue.clone();

            let query = match adapter.query_state(&job_id).await {
                Ok(q) => q,
                Err(_) => {
                    events.push(SupervisorEvent::TransientQuery { job_id, queue: queue_name });
                    i += 1;
                    continue;
                }
            };

            match query.state {
                StateTag::Pending => {
                    if Self::try_reroute(router_order, queues, registry, i, &queue_name, adapter).await {
                        events.push(SupervisorEvent::Rerouted { job_id, from_queue: queue_name });
                        continue;
                    }
                    i += 1;
                }
                StateTag::Running => {
                    i += 1;
                }
                StateTag::Failed => {
                    let job = registry.live_jobs.remove(i);
                    if let Some(qi) = queues.index_of(&queue_name) {
                        queues.list_all_mut()[qi].current_load = queues.list_all_mut()[qi].current_load.saturating_sub(1);
                    }
                    let mut commands = job.commands;
                    for command in &mut commands {
                        command.record_failure(&queue_name);
                        if command.total_attempts() > retry_bound {
                            return Err(FatalRetryLimit {
                                command_line: command.line.clone(),
                                total_attempts: command.total_attempts(),
                                retry_bound,
                            });
                        }
                    }
                    let count = commands.len();
                    registry.reinsert(commands, false);
                    events.push(SupervisorEvent::Retried { job_id, queue: queue_name, commands: count });
                }
                StateTag::Preempted => {
                    let job = registry.live_jobs.remove(i);
                    if let Some(qi) = queues.index_of(&queue_name) {
                        queues.list_all_mut()[qi].current_load = queues.list_all_mut()[qi].current_load.saturating_sub(1);
                    }
                    let count = job.commands.len();
                    registry.reinsert(job.commands, false);
                    events.push(SupervisorEvent::Preempted { job_id, queue: queue_name, commands: count });
                }
                StateTag::Succeeded => {
                    let job = registry.live_jobs.remove(i);
                    let commands_in_job = job.commands.len();
                    if let Some(qi) = queues.index_of(&queue_name) {
                        let q = &mut queues.list_all_mut()[qi];
                        q.current_load = q.current_load.saturating_sub(1);
                        let per_command = query.cpu_time_seconds.unwrap_or(0) as f64 / q.commands_per_job as f64;
                        cpu_time.record(per_command, commands_in_job as u64);
                        q.record_completions(commands_in_job, now);
                    }
                    events.push(SupervisorEvent::Succeeded { job_id, queue: queue_name, commands: commands_in_job });
                }
                StateTag::Unknown => {
                    events.push(SupervisorEvent::UnknownState { job_id, queue: queue_name });
                    i += 1;
                }
            }
        }

        Ok(events)
    }

    /// Attempts to re-route the live job at `job_index` toward an earlier,
    /// more-contested queue in Router order. Returns `true` (and removes
    /// the job, reinserting its commands at the backlog head) if a
    /// re-route happened.
    async fn try_reroute(
        router_order: &[usize],
        queues: &mut QueueTable,
        registry: &mut Registry,
        job_index: usize,
        own_queue: &str,
        adapter: &dyn ClusterAdapter,
    ) -> bool {
        let mut preclaimed_slots = registry.backlog_len() as f64;

        for &qi in router_order {
            let partition = queues.list_all()[qi].partition.clone();
            if partition == own_queue {
                break;
            }

            let (current_load, ideal_jobs, commands_per_job) = {
                let q = &queues.list_all()[qi];
                (q.current_load as f64, q.ideal_jobs, q.commands_per_job as f64)
            };

            let effective_jobs = current_load + preclaimed_slots / commands_per_job;
            if effective_jobs < ideal_jobs {
                let job_id = registry.live_jobs[job_index].id.clone();
                let _ = adapter.cancel(&job_id).await;
                let job = registry.live_jobs.remove(job_index);
                if let Some(own_idx) = queues.index_of(own_queue) {
                    let q = &mut queues.list_all_mut()[own_idx];
                    q.current_load = q.current_load.saturating_sub(1);
                }
                registry.reinsert(job.commands, true);
                return true;
            }

            let room = (ideal_jobs - current_load).ceil() * commands_per_job;
            preclaimed_slots = (preclaimed_slots - room).max(0.0);
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::adapter::{QueryResult, ResourceHints, SubmissionFailure, TransientFailure};
    use crate::domain::{Command, Job};
    use crate::queue::Queue;
    use metasched_core::QueueRecord;

    fn record(partition: &str, commands_per_job: u32, max_jobs: u32) -> QueueRecord {
        QueueRecord {
            partition: partition.into(),
            account: "acct".into(),
            commands_per_job,
            max_jobs,
            qos: None,
        }
    }

    struct FixedState(StateTag, Option<u64>);

    #[async_trait]
    impl ClusterAdapter for FixedState {
        async fn submit(
            &self,
            _queue: &Queue,
            _commands: &[Command],
            _hints: &ResourceHints,
        ) -> Result<String, SubmissionFailure> {
            unimplemented!()
        }

        async fn query_state(&self, _job_id: &str) -> Result<QueryResult, TransientFailure> {
            Ok(QueryResult { state: self.0, cpu_time_seconds: self.1 })
        }

        async fn cancel(&self, _job_id: &str) -> Result<(), TransientFailure> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn short_final_pack_divides_cpu_time_by_configured_pack_size() {
        let mut table = QueueTable::new(vec![Queue::from_record(&record("q0", 4, 5))]);
        table.list_all_mut()[0].current_load = 1;
        let mut registry = Registry::default();
        registry.add_job(Job {
            id: "1".into(),
            queue: "q0".into(),
            commands: vec![
                Command::new("a".into(), ["q0".to_string()]),
                Command::new("b".into(), ["q0".to_string()]),
            ],
        });

        let adapter = FixedState(StateTag::Succeeded, Some(40));
        let mut cpu_time = CpuTimeStats::default();
        let events = LifecycleSupervisor::run(&[0], &mut table, &mut registry, &adapter, 3, &mut cpu_time, Utc::now())
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(cpu_time.finished_count, 2);
        assert!((cpu_time.total_seconds - 20.0).abs() < 1e-9);
        assert_eq!(table.list_all()[0].current_load, 0);
    }

    #[tokio::test]
    async fn failed_job_past_retry_bound_is_fatal() {
        let mut table = QueueTable::new(vec![Queue::from_record(&record("q0", 1, 5))]);
        let mut registry = Registry::default();
        let mut command = Command::new("a".into(), ["q0".to_string()]);
        command.record_failure("q0");
        command.record_failure("q0");
        registry.add_job(Job {
            id: "1".into(),
            queue: "q0".into(),
            commands: vec![command],
        });

        let adapter = FixedState(StateTag::Failed, None);
        let mut cpu_time = CpuTimeStats::default();
        let result =
            LifecycleSupervisor::run(&[0], &mut table, &mut registry, &adapter, 2, &mut cpu_time, Utc::now()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn preempted_job_returns_commands_without_incrementing_attempts() {
        let mut table = QueueTable::new(vec![Queue::from_record(&record("q0", 1, 5))]);
        let mut registry = Registry::default();
        let command = Command::new("a".into(), ["q0".to_string()]);
        registry.add_job(Job {
            id: "1".into(),
            queue: "q0".into(),
            commands: vec![command],
        });

        let adapter = FixedState(StateTag::Preempted, None);
        let mut cpu_time = CpuTimeStats::default();
        LifecycleSupervisor::run(&[0], &mut table, &mut registry, &adapter, 5, &mut cpu_time, Utc::now())
            .await
            .unwrap();

        assert_eq!(registry.backlog_len(), 1);
        assert_eq!(registry.backlog.front().unwrap().tries_for("q0"), 0);
    }

    #[tokio::test]
    async fn pending_job_reroutes_to_a_faster_queue_ahead_in_router_order() {
        let mut table = QueueTable::new(vec![
            Queue::from_record(&record("a", 1, 5)),
            Queue::from_record(&record("b", 1, 5)),
        ]);
        table.list_all_mut()[0].current_load = 1;
        table.list_all_mut()[1].ideal_jobs = 1.0;

        let mut registry = Registry::default();
        registry.add_job(Job {
            id: "1".into(),
            queue: "a".into(),
            commands: vec![Command::new("x".into(), ["a".to_string(), "b".to_string()])],
        });

        let adapter = FixedState(StateTag::Pending, None);
        let mut cpu_time = CpuTimeStats::default();
        let events = LifecycleSupervisor::run(&[1, 0], &mut table, &mut registry, &adapter, 5, &mut cpu_time, Utc::now())
            .await
            .unwrap();

        assert!(matches!(events.as_slice(), [SupervisorEvent::Rerouted { .. }]));
        assert_eq!(registry.live_job_count(), 0);
        assert_eq!(registry.backlog_len(), 1);
        assert_eq!(table.list_all()[0].current_load, 0);
    }

    #[tokio::test]
    async fn pending_job_is_left_alone_when_its_own_queue_is_reached_first() {
        let mut table = QueueTable::new(vec![
            Queue::from_record(&record("a", 1, 5)),
            Queue::from_record(&record("b", 1, 5)),
        ]);
        let mut registry = Registry::default();
        registry.add_job(Job {
            id: "1".into(),
            queue: "a".into(),
            commands: vec![Command::new("x".into(), ["a".to_string(), "b".to_string()])],
        });

        let adapter = FixedState(StateTag::Pending, None);
        let mut cpu_time = CpuTimeStats::default();
        let events = LifecycleSupervisor::run(&[0, 1], &mut table, &mut registry, &adapter, 5, &mut cpu_time, Utc::now())
            .await
            .unwrap();

        assert!(events.is_empty());
        assert_eq!(registry.live_job_count(), 1);
    }

    #[tokio::test]
    async fn unrecognized_state_warns_and_leaves_the_job_in_place() {
        let mut table = QueueTable::new(vec![Queue::from_record(&record("q0", 1, 5))]);
        let mut registry = Registry::default();
        registry.add_job(Job {
            id: "1".into(),
            queue: "q0".into(),
            commands: vec![Command::new("a".into(), ["q0".to_string()])],
        });

        let adapter = FixedState(StateTag::Unknown, None);
        let mut cpu_time = CpuTimeStats::default();
        let events = LifecycleSupervisor::run(&[0], &mut table, &mut registry, &adapter, 5, &mut cpu_time, Utc::now())
            .await
            .unwrap();

        assert!(matches!(events.as_slice(), [SupervisorEvent::UnknownState { .. }]));
        assert_eq!(registry.live_job_count(), 1);
    }
}
