use std::collections::VecDeque;

use crate::domain::{Command, Job};

/// Owns the pending command backlog and the set of live jobs.
///
/// Backlog and live-job command sets are disjoint by construction: commands
/// only ever move between the two via `take_eligible_for` (backlog -> job,
/// inside the Submission Loop) and `reinsert` (job -> backlog, inside the
/// Supervisor), never copied.
#[derive(Default)]
pub struct Registry {
    pub(crate) backlog: VecDeque<Command>,
    pub(crate) live_jobs: Vec<Job>,
}

impl Registry {
    pub fn append_commands(&mut self, commands: impl IntoIterator<Item = Command>) {
        self.backlog.extend(commands);
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn live_job_count(&self) -> usize {
        self.live_jobs.len()
    }

    pub fn live_command_count(&self) -> usize {
        self.live_jobs.iter().map(|j| j.commands.len()).sum()
    }

    pub fn total_unfinished(&self) -> usize {
        self.backlog_len() + self.live_command_count()
    }

    /// Walks the backlog in order, extracting commands eligible for `queue`
    /// until either the backlog is exhausted or `max_count` is reached.
    ///
    /// `max_count` is real-valued on purpose: the Submission Loop compares
    /// the real ideal load directly against the running extracted count
    /// rather than pre-flooring it, so a fractional ideal load of e.g. 4.5
    /// still yields a take of 5 once the fifth eligible command is found
    /// (the loop condition is checked before each extraction, not after).
    pub fn take_eligible_for(&mut self, queue: &str, max_count: f64) -> Vec<Command> {
        let mut taken = Vec::new();
        let mut i = 0;
        while i < self.backlog.len() && (taken.len() as f64) < max_count {
            if self.backlog[i].is_eligible_for(queue) {
                taken.push(self.backlog.remove(i).expect("index in bounds"));
            } else {
                i += 1;
            }
        }
        taken
    }

    /// Returns commands to the backlog. Retries and preemptions append to
    /// the tail; re-routing a still-pending job prepends to the head so
    /// those commands are reconsidered before the rest of the backlog on
    /// the very next Submission Loop pass.
    pub fn reinsert(&mut self, commands: Vec<Command>, at_head: bool) {
        if at_head {
            for command in commands.into_iter().rev() {
                self.backlog.push_front(command);
            }
        } else {
            self.backlog.extend(commands);
        }
    }

    /// Number of commands (backlog and live, taken as a snapshot) currently
    /// eligible for `queue`. A command already running in `queue` counts as
    /// compatible even though it would become ineligible there the moment
    /// it fails; the Router re-runs every tick so this snapshot is
    /// acceptable rather than predictive.
    pub fn compatible_commands(&self, queue: &str) -> usize {
        let in_backlog = self
            .backlog
            .iter()
            .filter(|c| c.is_eligible_for(queue))
            .count();
        let in_flight = self
            .live_jobs
            .iter()
            .flat_map(|j| j.commands.iter())
            .filter(|c| c.is_eligible_for(queue))
            .count();
        in_backlog + in_flight
    }

    pub fn add_job(&mut self, job: Job) {
        self.live_jobs.push(job);
    }

    pub fn live_jobs(&self) -> &[Job] {
        &self.live_jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(line: &str) -> Command {
        Command::new(line.into(), ["a".to_string(), "b".to_string()])
    }

    #[test]
    fn backlog_and_live_stay_disjoint_across_a_round_trip() {
        let mut registry = Registry::default();
        registry.append_commands((0..4).map(|i| command(&format!("cmd{i}"))));

        let taken = registry.take_eligible_for("a", 2.0);
        assert_eq!(taken.len(), 2);
        assert_eq!(registry.backlog_len(), 2);

        registry.add_job(Job {
            id: "1".into(),
            queue: "a".into(),
            commands: taken,
        });
        assert_eq!(registry.live_command_count(), 2);
        assert_eq!(registry.total_unfinished(), 4);

        let job = registry.live_jobs.remove(0);
        registry.reinsert(job.commands, true);
        assert_eq!(registry.backlog_len(), 4);
        assert_eq!(registry.live_job_count(), 0);
    }

    #[test]
    fn fractional_max_count_rounds_up_to_the_next_whole_command() {
        let mut registry = Registry::default();
        registry.append_commands((0..5).map(|i| command(&format!("cmd{i}"))));
        let taken = registry.take_eligible_for("a", 4.5);
        assert_eq!(taken.len(), 5);
    }
}
