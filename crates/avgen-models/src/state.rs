//! Process-wide generation progress, persisted between runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobRecord, RecordError};

/// Root document of the state file.
///
/// Unknown keys are ignored on load so newer writers never break older
/// readers mid-job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GenerationState {
    /// Timestamp of the most recent orchestrator invocation
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,

    /// Job name -> progress record
    #[serde(default)]
    pub jobs: BTreeMap<String, JobRecord>,
}

impl GenerationState {
    /// Create an empty state (first run or unreadable checkpoint).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn job(&self, name: &str) -> Option<&JobRecord> {
        self.jobs.get(name)
    }

    /// Get a job record, creating a pending one if the job is new.
    pub fn job_mut(&mut self, name: &str) -> &mut JobRecord {
        self.jobs.entry(name.to_string()).or_default()
    }

    pub fn mark_run_started(&mut self) {
        self.last_run = Some(Utc::now());
    }

    /// Check every record's invariants, returning the first violation.
    pub fn check_invariants(&self) -> Result<(), (String, RecordError)> {
        for (name, record) in &self.jobs {
            record.check_invariants().map_err(|e| (name.clone(), e))?;
        }
        Ok(())
    }
}
