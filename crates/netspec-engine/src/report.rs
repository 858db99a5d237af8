//! Serializable results of a mining run.

use serde::Serialize;

use netspec_model::policy::PolicyStatus;

use crate::store::HypothesisStore;

/// How many records sit in each status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub unknown: usize,
    pub holds: usize,
    pub holds_not: usize,
}

impl StatusCounts {
    pub fn of(store: &HypothesisStore) -> Self {
        StatusCounts {
            unknown: store.count(PolicyStatus::Unknown),
            holds: store.count(PolicyStatus::Holds),
            holds_not: store.count(PolicyStatus::HoldsNot),
        }
    }
}

/// One exported policy record, flattened for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyRow {
    pub policy_type: String,
    pub subnet: String,
    pub specifics: String,
    pub source: String,
    pub status: String,
    pub destinations: Vec<String>,
}

/// One step of the scheduler, for offline analysis of the cost model.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsEvent {
    Sample {
        duration_secs: f64,
        /// Policies this sample removed from the guess; negative on the
        /// baseline where there is no previous guess to compare with.
        eliminated: i64,
        guess_size: usize,
    },
    Verification {
        duration_secs: f64,
        verified: usize,
        violated: usize,
    },
    Trim {
        removed: usize,
    },
    ModeSwitch {
        dense: bool,
    },
}

/// Why the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// No Unknown policies left.
    PoliciesResolved,
    /// Every admissible environment was sampled.
    SamplesExhausted,
    /// The sampler could not produce another unused environment.
    SamplerStalled,
}

/// The finished run: the mined specification plus scheduler telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub termination: TerminationReason,
    pub steps: u64,
    pub counts: StatusCounts,
    pub rows: Vec<PolicyRow>,
    pub events: Vec<StatsEvent>,
}

pub(crate) fn export_rows(store: &HypothesisStore) -> Vec<PolicyRow> {
    store
        .records()
        .map(|(key, record)| PolicyRow {
            policy_type: key.policy_type.to_string(),
            subnet: key.subnet.to_string(),
            specifics: key.specifics.to_string(),
            source: key.source.to_string(),
            status: record.status().to_string(),
            destinations: record
                .destinations()
                .iter()
                .map(|destination| destination.to_string())
                .collect(),
        })
        .collect()
}
