use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Command;
use crate::queue::Queue;

/// Resource envelope for a submission, independent of any particular
/// scheduler's CLI flag names.
#[derive(Debug, Clone)]
pub struct ResourceHints {
    pub memory_gb: u32,
    pub timeout_minutes: u32,
    pub output_dir: String,
}

/// The cluster scheduler's closed view of a job's lifecycle. Adapters
/// translate whatever vocabulary their backend uses (Slurm's `PENDING`,
/// `RUNNING`, `COMPLETED`, ... ) into this set once, at the boundary, so
/// nothing upstream ever matches on a scheduler-specific string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTag {
    Pending,
    Running,
    Succeeded,
    Failed,
    Preempted,
    Unknown,
}

/// The outcome of a state query: the tag plus, when the scheduler can
/// report it, CPU time consumed so far.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub state: StateTag,
    pub cpu_time_seconds: Option<u64>,
}

/// A submission the adapter refused to even hand to the scheduler queue.
/// Distinguished from [`TransientFailure`] because callers need to tell
/// "the queue is momentarily unreachable, retry the request" apart from
/// "this submission is permanently unschedulable as written".
#[derive(Debug, Error)]
pub enum SubmissionFailure {
    #[error("submission transiently failed: {0}")]
    Transient(#[from] TransientFailure),
    #[error("submission rejected: {0}")]
    Fatal(String),
}

/// A scheduler-side hiccup (socket timeout, connection refused, momentary
/// overload) that the Supervisor should treat as retryable rather than as
/// a command failure to be charged against the command's attempt count.
#[derive(Debug, Error)]
#[error("transient cluster failure: {0}")]
pub struct TransientFailure(pub String);

/// The boundary between the engine's scheduling logic and a concrete
/// cluster scheduler. Every method returns the engine's own closed error
/// and state vocabulary; no scheduler-specific string ever crosses this
/// trait.
#[async_trait]
pub trait ClusterAdapter: Send + Sync {
    /// Submits `commands`, packed as a single job, to `queue`'s
    /// partition/account/qos, returning the scheduler's native job id on
    /// success.
    async fn submit(
        &self,
        queue: &Queue,
        commands: &[Command],
        hints: &ResourceHints,
    ) -> Result<String, SubmissionFailure>;

    /// Polls the scheduler for `job_id`'s current state.
    async fn query_state(&self, job_id: &str) -> Result<QueryResult, TransientFailure>;

    /// Best-effort cancellation; adapters should not treat "already gone"
    /// as an error since the Supervisor may race a natural completion.
    async fn cancel(&self, job_id: &str) -> Result<(), TransientFailure>;
}
