use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

/// One `[[queue]]` table from the queue configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueRecord {
    pub partition: String,
    pub account: String,
    pub commands_per_job: u32,
    #[serde(default = "default_max_jobs")]
    pub max_jobs: u32,
    #[serde(default)]
    pub qos: Option<String>,
}

fn default_max_jobs() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default, rename = "queue")]
    queues: Vec<QueueRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: Box<toml::de::Error>,
    },
    #[error("config file {path} declares no queues")]
    Empty { path: String },
    #[error("queue {partition:?} has commands_per_job = 0; must be at least 1")]
    ZeroPackSize { partition: String },
    #[error("queue {partition:?} is declared more than once")]
    DuplicatePartition { partition: String },
}

/// Load and validate the queue table from a TOML config file.
///
/// Validates that every queue has a non-zero pack size and that partition
/// identifiers are unique, so that the Router never has to special-case a
/// malformed queue once the control loop starts.
pub fn load_queue_config(path: &Path) -> Result<Vec<QueueRecord>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let file: ConfigFile = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source: Box::new(source),
    })?;

    if file.queues.is_empty() {
        return Err(ConfigError::Empty {
            path: path.display().to_string(),
        });
    }

    let mut seen = HashSet::with_capacity(file.queues.len());
    for queue in &file.queues {
        if queue.commands_per_job == 0 {
            return Err(ConfigError::ZeroPackSize {
                partition: queue.partition.clone(),
            });
        }
        if !seen.insert(queue.partition.clone()) {
            return Err(ConfigError::DuplicatePartition {
                partition: queue.partition.clone(),
            });
        }
    }

    Ok(file.queues)
}
