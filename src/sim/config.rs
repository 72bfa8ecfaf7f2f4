use crate::error::SimError;
use crate::sim::SimTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Simulation options consumed by the core. Parsing the on-disk format is the
/// embedder's job; this struct only carries and validates the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Lookahead in nanoseconds; also the execution window width. Must be > 0.
    pub min_time_jump: u64,
    /// Halt deadline in nanoseconds. Must be > 0.
    pub end_time: u64,
    /// Worker threads; 0 runs hosts inline on the engine thread.
    #[serde(default)]
    pub n_workers: usize,
    /// Path of the topology graph description.
    pub topology_path: PathBuf,
    /// PRNG seed, passed through to random sources.
    #[serde(default)]
    pub seed: u64,
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.min_time_jump == 0 {
            return Err(SimError::ConfigInvalid(
                "min_time_jump must be > 0".to_string(),
            ));
        }
        if self.end_time == 0 {
            return Err(SimError::ConfigInvalid("end_time must be > 0".to_string()));
        }
        if self.topology_path.as_os_str().is_empty() {
            return Err(SimError::ConfigInvalid(
                "topology_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn min_time_jump(&self) -> SimTime {
        SimTime(self.min_time_jump)
    }

    pub fn end_time(&self) -> SimTime {
        SimTime(self.end_time)
    }
}
