//! Shared link-coverage accounting for the weighted samplers.
//!
//! The weight graph spans every symbolic link. For each Unknown policy
//! it walks every forwarding-graph simple path from the policy's source
//! to the sink and charges the path's edges, excluding the final hop
//! into the sink. Summed charges drive the "sum" sampler; per-edge
//! policy-id sets drive the greedy set-cover samplers.

use std::collections::BTreeSet;

use netspec_dataplane::SINK;
use netspec_model::environment::{ConcreteEnvironment, Environment};
use netspec_model::link::Link;

use super::SamplerView;
use crate::EngineError;

#[derive(Debug, Clone)]
pub(crate) struct WeightGraph {
    /// Canonical edge names, in link order.
    edges: Vec<String>,
    /// Every link name in the environment, for concretization.
    link_names: Vec<String>,
}

impl WeightGraph {
    pub(crate) fn new(environment: &Environment) -> Self {
        let link_names: Vec<String> =
            environment.links().map(|link| link.name.clone()).collect();
        WeightGraph {
            edges: link_names.clone(),
            link_names,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.edges.len()
    }

    pub(crate) fn edge_name(&self, edge: usize) -> &str {
        &self.edges[edge]
    }

    /// Aggregate per-edge coverage weight over all Unknown policies.
    pub(crate) fn policy_weights(
        &self,
        view: &SamplerView<'_>,
    ) -> Result<Vec<u64>, EngineError> {
        let mut weights = vec![0u64; self.edges.len()];
        self.charge(view, |edge, count| weights[edge] += count as u64)?;
        Ok(weights)
    }

    /// Per-edge sets of pseudo policy ids, one id per Unknown policy.
    pub(crate) fn policy_sets(
        &self,
        view: &SamplerView<'_>,
    ) -> Result<Vec<BTreeSet<u64>>, EngineError> {
        let mut sets = vec![BTreeSet::new(); self.edges.len()];
        let mut policy_id = 0u64;
        self.charge_per_policy(view, |edge, id| {
            sets[edge].insert(id);
        }, &mut policy_id)?;
        Ok(sets)
    }

    pub(crate) fn concrete_env(&self, failed: &BTreeSet<String>) -> ConcreteEnvironment {
        ConcreteEnvironment::from_failed_links(
            self.link_names.iter().map(String::as_str),
            failed,
        )
    }

    fn charge(
        &self,
        view: &SamplerView<'_>,
        mut charge_edge: impl FnMut(usize, usize),
    ) -> Result<(), EngineError> {
        for (subnet, counts) in view.source_counts {
            let Some(fwd_graph) = view.forwarding.get(subnet) else {
                return Err(EngineError::MissingForwardingGraph(*subnet));
            };
            for (source, count) in counts {
                for path in fwd_graph.simple_paths(source, SINK) {
                    for window in path.windows(2).take(path.len().saturating_sub(2)) {
                        let name = Link::canonical_name(&window[0], &window[1]);
                        if let Some(edge) = self.edges.iter().position(|e| *e == name) {
                            charge_edge(edge, *count);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn charge_per_policy(
        &self,
        view: &SamplerView<'_>,
        mut charge_edge: impl FnMut(usize, u64),
        policy_id: &mut u64,
    ) -> Result<(), EngineError> {
        for (subnet, counts) in view.source_counts {
            let Some(fwd_graph) = view.forwarding.get(subnet) else {
                return Err(EngineError::MissingForwardingGraph(*subnet));
            };
            for (source, count) in counts {
                let paths = fwd_graph.simple_paths(source, SINK);
                for _ in 0..*count {
                    *policy_id += 1;
                    for path in &paths {
                        for window in path.windows(2).take(path.len().saturating_sub(2)) {
                            let name = Link::canonical_name(&window[0], &window[1]);
                            if let Some(edge) = self.edges.iter().position(|e| *e == name) {
                                charge_edge(edge, *policy_id);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
