//! The scheduling core: Router, Submission Loop, and Lifecycle Supervisor
//! driving commands through a configurable set of cluster-scheduler
//! queues, plus the Cluster Adapter boundary and a concrete Slurm
//! implementation of it.

mod adapter;
mod api;
mod domain;
mod engine;
mod error;
mod queue;
mod registry;
mod report;
mod router;
mod slurm;
mod submission;
mod supervisor;

pub use adapter::{ClusterAdapter, QueryResult, ResourceHints, StateTag, SubmissionFailure, TransientFailure};
pub use api::{start_engine, EngineConfig, EngineEvent, EngineHandle, EngineOutcome, StatusSnapshot, MONITOR_DISABLED};
pub use domain::{Command, Job, QueueId};
pub use error::EngineError;
pub use queue::Queue;
pub use report::{CpuTimeStats, FinalStats, QueueReportRow, ReportSnapshot};
pub use slurm::SlurmAdapter;
pub use submission::FatalSubmission;
pub use supervisor::{FatalRetryLimit, SupervisorEvent};
