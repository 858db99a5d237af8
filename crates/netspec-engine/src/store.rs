//! The policy hypothesis store.
//!
//! Records are keyed by `(type, subnet, specifics, source)` and carry
//! the set of destination variants observed plus the samples that
//! confirmed them. The merge semantics implement "holds in every
//! sampled environment": a record absent from one sample is demoted,
//! a record first seen after the baseline was never universal to begin
//! with, and `HoldsNot` is absorbing.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use netspec_model::policy::{
    PolicyCandidate, PolicyDestination, PolicyKey, PolicySource, PolicySpecifics, PolicyStatus,
    PolicyType,
};
use netspec_model::prefix::Ipv4Prefix;
use tracing::{debug, warn};

use crate::EngineError;

/// One tracked hypothesis.
#[derive(Debug, Clone)]
pub struct PolicyRecord {
    status: PolicyStatus,
    destinations: BTreeSet<PolicyDestination>,
    confirming_samples: BTreeSet<u64>,
}

impl PolicyRecord {
    pub fn status(&self) -> PolicyStatus {
        self.status
    }

    pub fn destinations(&self) -> &BTreeSet<PolicyDestination> {
        &self.destinations
    }

    pub fn confirming_samples(&self) -> &BTreeSet<u64> {
        &self.confirming_samples
    }
}

/// Outcome of merging one sample's candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeOutcome {
    /// Fractional shrinkage of the Unknown and Holds set; 1.0 on the
    /// baseline merge.
    pub progress: f64,
    /// Size of the Unknown and Holds set after the merge.
    pub guess_size: usize,
}

/// The next batch of policies to verify: every Unknown record sharing
/// one `(type, subnet, specifics)` group.
#[derive(Debug, Clone)]
pub struct QueryGroup {
    pub policy_type: PolicyType,
    pub subnet: Ipv4Prefix,
    pub specifics: PolicySpecifics,
    pub sources: Vec<PolicySource>,
    pub destination: PolicyDestination,
}

/// Keyed policy records with merge, trim, and checkpoint support.
#[derive(Debug, Clone, Default)]
pub struct HypothesisStore {
    records: IndexMap<PolicyKey, PolicyRecord>,
    initialized: bool,
    previous_size: usize,
    checkpoint: Option<BTreeMap<PolicyKey, PolicyStatus>>,
}

impl HypothesisStore {
    pub fn new() -> Self {
        HypothesisStore::default()
    }

    /// Fold one sample's candidate set into the store.
    ///
    /// The first merge seeds the store with every candidate as Unknown.
    /// Afterwards: keys in both sides union their destinations and gain
    /// a confirming sample; store-only keys are demoted (the sample is a
    /// counterexample); sample-only keys enter directly as `HoldsNot`
    /// (no unbroken history from the baseline).
    pub fn merge(&mut self, candidates: Vec<PolicyCandidate>, sample_id: u64) -> MergeOutcome {
        let mut incoming: IndexMap<PolicyKey, BTreeSet<PolicyDestination>> = IndexMap::new();
        for candidate in candidates {
            incoming
                .entry(candidate.key())
                .or_default()
                .insert(candidate.destination);
        }

        let outcome = if !self.initialized {
            self.initialized = true;
            for (key, destinations) in incoming {
                self.records.insert(
                    key,
                    PolicyRecord {
                        status: PolicyStatus::Unknown,
                        destinations,
                        confirming_samples: BTreeSet::from([sample_id]),
                    },
                );
            }
            self.previous_size = self.records.len();
            MergeOutcome {
                progress: 1.0,
                guess_size: self.previous_size,
            }
        } else {
            for (key, record) in &mut self.records {
                match incoming.swap_remove(key) {
                    Some(destinations) => {
                        record.destinations.extend(destinations);
                        record.confirming_samples.insert(sample_id);
                    }
                    // held in every previous sample, absent from this one
                    None => record.status = PolicyStatus::HoldsNot,
                }
            }

            for (key, destinations) in incoming {
                self.records.insert(
                    key,
                    PolicyRecord {
                        status: PolicyStatus::HoldsNot,
                        destinations,
                        confirming_samples: BTreeSet::from([sample_id]),
                    },
                );
            }

            let current_size = self.guess_size();
            let progress = if self.previous_size == 0 {
                0.0
            } else {
                (self.previous_size as f64 - current_size as f64) / self.previous_size as f64
            };
            self.previous_size = current_size;
            MergeOutcome {
                progress,
                guess_size: current_size,
            }
        };

        self.records.sort_keys();
        outcome
    }

    /// Size of the Unknown and Holds set.
    pub fn guess_size(&self) -> usize {
        self.count(PolicyStatus::Unknown) + self.count(PolicyStatus::Holds)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count(&self, status: PolicyStatus) -> usize {
        self.records
            .values()
            .filter(|record| record.status == status)
            .count()
    }

    pub fn record(&self, key: &PolicyKey) -> Option<&PolicyRecord> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = (&PolicyKey, &PolicyRecord)> {
        self.records.iter()
    }

    /// Set a record's status. `HoldsNot` is absorbing: a demoted record
    /// never leaves that state again.
    pub fn transition(&mut self, key: &PolicyKey, status: PolicyStatus) -> bool {
        let Some(record) = self.records.get_mut(key) else {
            warn!(source = %key.source, subnet = %key.subnet, "transition on unknown policy key");
            return false;
        };
        if record.status == PolicyStatus::HoldsNot && status != PolicyStatus::HoldsNot {
            debug!(source = %key.source, subnet = %key.subnet, "ignoring transition out of holdsnot");
            return false;
        }
        record.status = status;
        true
    }

    /// The first Unknown record's `(type, subnet, specifics)` group,
    /// with every Unknown source in it.
    pub fn next_query_group(&self) -> Result<Option<QueryGroup>, EngineError> {
        if !self.initialized {
            return Err(EngineError::UninitializedStore);
        }

        let Some((first, _)) = self
            .records
            .iter()
            .find(|(_, record)| record.status == PolicyStatus::Unknown)
        else {
            return Ok(None);
        };

        let mut sources = Vec::new();
        let mut destinations = BTreeSet::new();
        for (key, record) in &self.records {
            if record.status == PolicyStatus::Unknown
                && key.policy_type == first.policy_type
                && key.subnet == first.subnet
                && key.specifics == first.specifics
            {
                sources.push(key.source.clone());
                destinations.extend(record.destinations.iter().cloned());
            }
        }

        // all grouped records share one egress interface; the set is a
        // singleton for every policy type the trimmer accepts
        let Some(destination) = destinations.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(QueryGroup {
            policy_type: first.policy_type,
            subnet: first.subnet,
            specifics: first.specifics.clone(),
            sources,
            destination,
        }))
    }

    /// Per-subnet source multiplicities over records with `status`,
    /// consumed by the coverage-weighted samplers.
    pub fn source_counts(
        &self,
        status: PolicyStatus,
    ) -> Result<BTreeMap<Ipv4Prefix, BTreeMap<String, usize>>, EngineError> {
        if !self.initialized {
            return Err(EngineError::UninitializedStore);
        }

        let mut counts: BTreeMap<Ipv4Prefix, BTreeMap<String, usize>> = BTreeMap::new();
        for (key, record) in &self.records {
            if record.status == status {
                *counts
                    .entry(key.subnet)
                    .or_default()
                    .entry(key.source.0.clone())
                    .or_default() += 1;
            }
        }
        Ok(counts)
    }

    /// Demote every Unknown non-isolation record whose source and
    /// destination routers cannot survive the failure budget: if the
    /// pair is not k-edge-connected, some admissible environment cuts
    /// them apart, so the policy is vacuously falsifiable.
    pub fn trim(&mut self, k_connected_pairs: &BTreeSet<(String, String)>) -> usize {
        let mut trimmed = 0;
        for (key, record) in &mut self.records {
            if record.status != PolicyStatus::Unknown
                || key.policy_type == PolicyType::Isolation
            {
                continue;
            }

            let dst_routers: BTreeSet<&str> = record
                .destinations
                .iter()
                .map(|d| d.router.as_str())
                .collect();
            let Some(dst_router) = dst_routers.iter().next() else {
                continue;
            };
            if dst_routers.len() > 1 {
                warn!(subnet = %key.subnet, "more than one router connected to this subnet");
                continue;
            }

            let src_router = key.source.0.as_str();
            let pair = if src_router < *dst_router {
                (src_router.to_string(), dst_router.to_string())
            } else {
                (dst_router.to_string(), src_router.to_string())
            };

            if !k_connected_pairs.contains(&pair) {
                record.status = PolicyStatus::HoldsNot;
                trimmed += 1;
            }
        }
        trimmed
    }

    /// Snapshot the status column for later [`restore_checkpoint`].
    ///
    /// [`restore_checkpoint`]: HypothesisStore::restore_checkpoint
    pub fn create_checkpoint(&mut self) {
        self.checkpoint = Some(
            self.records
                .iter()
                .map(|(key, record)| (key.clone(), record.status))
                .collect(),
        );
    }

    /// Restore the last checkpointed status column. Records added since
    /// the checkpoint keep their current status.
    pub fn restore_checkpoint(&mut self) {
        let Some(checkpoint) = self.checkpoint.take() else {
            return;
        };
        for (key, status) in checkpoint {
            if let Some(record) = self.records.get_mut(&key) {
                record.status = status;
            }
        }
    }

    /// Promote every remaining Unknown to Holds: no sampled environment
    /// contradicted it and no verification query disproved it.
    pub fn finalize(&mut self) {
        for record in self.records.values_mut() {
            if record.status == PolicyStatus::Unknown {
                record.status = PolicyStatus::Holds;
            }
        }
    }
}
