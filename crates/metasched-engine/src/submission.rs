use thiserror::Error;

use crate::adapter::{ClusterAdapter, ResourceHints, SubmissionFailure};
use crate::domain::Job;
use crate::queue::QueueTable;
use crate::registry::Registry;

/// A fatal submission failure the caller must surface: cancel every other
/// live job and exit non-zero.
#[derive(Debug, Error)]
#[error("submission to queue `{partition}` failed fatally: {reason}")]
pub struct FatalSubmission {
    pub partition: String,
    pub reason: String,
}

/// Pulls eligible backlog commands into new jobs, one queue at a time, in
/// Router order. Does not pre-compute a global allocation: each queue
/// takes as many eligible commands as its own remaining room allows,
/// which is what makes the Router's spill output binding without the
/// Submission Loop having to re-derive it.
pub struct SubmissionLoop;

impl SubmissionLoop {
    pub async fn run(
        order: &[usize],
        queues: &mut QueueTable,
        registry: &mut Registry,
        adapter: &dyn ClusterAdapter,
        hints: &ResourceHints,
    ) -> Result<(), FatalSubmission> {
        for &idx in order {
            let (partition, ideal_jobs, current_load, commands_per_job) = {
                let q = &queues.list_all()[idx];
                (q.partition.clone(), q.ideal_jobs, q.current_load, q.commands_per_job)
            };

            let need_commands = ((ideal_jobs - current_load as f64) * commands_per_job as f64).max(0.0);
            if need_commands <= 0.0 {
                continue;
            }

            let taken = registry.take_eligible_for(&partition, need_commands);
            if taken.is_empty() {
                continue;
            }

            for pack in taken.chunks(commands_per_job).map(|c| c.to_vec()) {
                match adapter.submit(&queues.list_all()[idx], &pack, hints).await {
                    Ok(job_id) => {
                        registry.add_job(Job {
                            id: job_id,
                            queue: partition.clone(),
                            commands: pack,
                        });
                        queues.list_all_mut()[idx].current_load += 1;
                    }
                    Err(SubmissionFailure::Transient(_)) => {
                        registry.reinsert(pack, false);
                    }
                    Err(SubmissionFailure::Fatal(reason)) => {
                        registry.reinsert(pack, false);
                        return Err(FatalSubmission { partition, reason });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::adapter::{QueryResult, TransientFailure};
    use crate::domain::Command;
    use crate::queue::Queue;
    use crate::router::Router;
    use chrono::Utc;
    use metasched_core::QueueRecord;

    struct AlwaysSucceeds;

    #[async_trait]
    impl ClusterAdapter for AlwaysSucceeds {
        async fn submit(
            &self,
            _queue: &Queue,
            _commands: &[Command],
            _hints: &ResourceHints,
        ) -> Result<String, SubmissionFailure> {
            Ok("1".to_string())
        }

        async fn query_state(&self, _job_id: &str) -> Result<QueryResult, TransientFailure> {
            unimplemented!()
        }

        async fn cancel(&self, _job_id: &str) -> Result<(), TransientFailure> {
            unimplemented!()
        }
    }

    struct AlwaysTransientlyFails;

    #[async_trait]
    impl ClusterAdapter for AlwaysTransientlyFails {
        async fn submit(
            &self,
            _queue: &Queue,
            _commands: &[Command],
            _hints: &ResourceHints,
        ) -> Result<String, SubmissionFailure> {
            Err(SubmissionFailure::Transient(TransientFailure("socket timed out".to_string())))
        }

        async fn query_state(&self, _job_id: &str) -> Result<QueryResult, TransientFailure> {
            unimplemented!()
        }

        async fn cancel(&self, _job_id: &str) -> Result<(), TransientFailure> {
            unimplemented!()
        }
    }

    fn record(partition: &str, commands_per_job: u32, max_jobs: u32) -> QueueRecord {
        QueueRecord {
            partition: partition.into(),
            account: "acct".into(),
            commands_per_job,
            max_jobs,
            qos: None,
        }
    }

    #[tokio::test]
    async fn packs_and_submits_against_router_order() {
        let mut table = QueueTable::new(vec![Queue::from_record(&record("q0", 2, 5))]);
        let mut registry = Registry::default();
        registry.append_commands((0..4).map(|i| Command::new(format!("cmd{i}"), ["q0".to_string()])));

        let order = Router::recompute(&mut table, &registry, Utc::now());
        let hints = ResourceHints {
            memory_gb: 1,
            timeout_minutes: 10,
            output_dir: "/tmp".into(),
        };
        SubmissionLoop::run(&order, &mut table, &mut registry, &AlwaysSucceeds, &hints)
            .await
            .unwrap();

        assert_eq!(registry.backlog_len(), 0);
        assert_eq!(registry.live_job_count(), 2);
        assert_eq!(table.list_all()[0].current_load, 2);
    }

    /// Scenario 5: a transient submission failure for a pack of 3 commands
    /// puts all 3 back on the backlog, registers no job, and changes no
    /// attempt counter.
    #[tokio::test]
    async fn transient_submission_failure_returns_the_pack_to_the_backlog() {
        let mut table = QueueTable::new(vec![Queue::from_record(&record("q0", 3, 5))]);
        let mut registry = Registry::default();
        registry.append_commands((0..3).map(|i| Command::new(format!("cmd{i}"), ["q0".to_string()])));

        let order = Router::recompute(&mut table, &registry, Utc::now());
        let hints = ResourceHints {
            memory_gb: 1,
            timeout_minutes: 10,
            output_dir: "/tmp".into(),
        };
        SubmissionLoop::run(&order, &mut table, &mut registry, &AlwaysTransientlyFails, &hints)
            .await
            .unwrap();

        assert_eq!(registry.backlog_len(), 3);
        assert_eq!(registry.live_job_count(), 0);
        assert_eq!(table.list_all()[0].current_load, 0);
        assert!(registry.backlog.iter().all(|c| c.tries_for("q0") == 0));
    }
}
