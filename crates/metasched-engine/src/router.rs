use chrono::{DateTime, Utc};

use crate::queue::QueueTable;
use crate::registry::Registry;

/// Computes queue scores and the constrained ideal-load distribution.
///
/// Stateless by design: every field it touches lives on `QueueTable`, so a
/// fresh `Router::recompute` call each tick is cheap and makes "Router
/// conservation" (see the crate's tests) easy to check in isolation.
pub struct Router;

impl Router {
    /// Recomputes `score` and `ideal_jobs` on every queue and returns the
    /// queue indices in Router order (score descending, ties by
    /// configuration order — a stable sort over the config-ordered indices
    /// gives exactly that).
    pub fn recompute(queues: &mut QueueTable, registry: &Registry, now: DateTime<Utc>) -> Vec<usize> {
        for queue in queues.list_all_mut() {
            queue.prune_completions(now);
            queue.score = 1.0 + queue.recent_completions() as f64;
        }

        let sum_score: f64 = queues.list_all().iter().map(|q| q.score).sum();
        let total_unfinished = registry.total_unfinished() as f64;

        for queue in queues.list_all_mut() {
            queue.ideal_jobs = if sum_score > 0.0 {
                total_unfinished * queue.score / sum_score / queue.commands_per_job as f64
            } else {
                0.0
            };
        }

        Self::spill(queues, registry, total_unfinished);

        let n = queues.list_all().len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            queues.list_all()[b]
                .score
                .partial_cmp(&queues.list_all()[a].score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
    }

    /// Walks queues in configuration order, capping each at
    /// `min(ideal_jobs, max_jobs, compatible_commands / pack_size)` and
    /// spilling the excess commands onward to later queues, weighted by
    /// their current allocated command load.
    fn spill(queues: &mut QueueTable, registry: &Registry, total_unfinished: f64) {
        let n = queues.list_all().len();
        let mut commands_for_others = total_unfinished;

        for i in 0..n {
            let partition = queues.list_all()[i].partition.clone();
            let compatible = registry.compatible_commands(&partition) as f64;

            let (ideal, max_jobs, pack_size) = {
                let q = &queues.list_all()[i];
                (q.ideal_jobs, q.max_jobs as f64, q.commands_per_job as f64)
            };

            let cap = ideal.min(max_jobs).min(compatible / pack_size);
            let excess = ideal - cap;
            queues.list_all_mut()[i].ideal_jobs = cap;
            commands_for_others -= cap * pack_size;

            if excess > 0.0 && commands_for_others > 0.0 {
                let excess_commands = excess * pack_size;
                for j in (i + 1)..n {
                    let qj_ideal = queues.list_all()[j].ideal_jobs;
                    let delta = excess_commands * qj_ideal / commands_for_others;
                    queues.list_all_mut()[j].ideal_jobs += delta;
                }
            }
        }
    }
}
