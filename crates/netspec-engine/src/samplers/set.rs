//! Greedy set-cover link selection.

use std::collections::BTreeSet;

use netspec_model::environment::{ConcreteEnvironment, Environment};
use tracing::debug;

use super::weight::WeightGraph;
use super::{Sampler, SamplerCore, SamplerView};
use crate::EngineError;

const MAX_TRIES: u32 = 2;

/// Picks the k links covering the most not-yet-covered Unknown
/// policies, recomputing marginal coverage after each pick. The choice
/// is deterministic, so only a couple of retries are worth anything.
#[derive(Debug, Clone)]
pub struct SetSampler {
    core: SamplerCore,
    graph: WeightGraph,
}

impl SetSampler {
    pub fn new(environment: Environment, max_samples: Option<u128>, seed: u64) -> Self {
        let graph = WeightGraph::new(&environment);
        SetSampler {
            core: SamplerCore::new(environment, max_samples, seed),
            graph,
        }
    }
}

/// The edge with the most policies not yet covered; first one on ties.
pub(crate) fn best_uncovered_edge(
    sets: &[BTreeSet<u64>],
    covered: &BTreeSet<u64>,
) -> Option<usize> {
    let mut best = None;
    let mut best_score = 0;
    for (edge, policies) in sets.iter().enumerate() {
        let score = policies.difference(covered).count();
        if best.is_none() || score > best_score {
            best = Some(edge);
            best_score = score;
        }
    }
    best
}

impl Sampler for SetSampler {
    fn core(&self) -> &SamplerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SamplerCore {
        &mut self.core
    }

    fn next_env(
        &mut self,
        view: &SamplerView<'_>,
    ) -> Result<Option<ConcreteEnvironment>, EngineError> {
        if !self.core.more_envs() {
            debug!("no samples left");
            return Ok(None);
        }

        let sets = self.graph.policy_sets(view)?;
        let k = (self.core.environment().max_failures() as usize).min(self.graph.len());

        let mut tries = 0;
        loop {
            tries += 1;

            let mut covered = BTreeSet::new();
            let mut failed = BTreeSet::new();
            for _ in 0..k {
                let Some(edge) = best_uncovered_edge(&sets, &covered) else {
                    break;
                };
                failed.insert(self.graph.edge_name(edge).to_string());
                covered.extend(sets[edge].iter().copied());
            }

            let env = self.graph.concrete_env(&failed);
            if self.core.use_env(&env) {
                return Ok(Some(env));
            }
            if tries > MAX_TRIES {
                debug!("greedy choice already used, giving up");
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use indexmap::IndexMap;
    use netspec_dataplane::graph::RouterGraph;
    use netspec_model::prefix::Ipv4Prefix;

    use crate::samplers::tests::triangle_env;

    #[test]
    fn greedy_pick_maximizes_marginal_coverage() {
        let sets = vec![
            BTreeSet::from([1, 2]),
            BTreeSet::from([2, 3, 4]),
            BTreeSet::from([1]),
        ];
        let covered = BTreeSet::new();
        assert_eq!(best_uncovered_edge(&sets, &covered), Some(1));

        let covered = BTreeSet::from([2, 3, 4]);
        assert_eq!(best_uncovered_edge(&sets, &covered), Some(0));
    }

    #[test]
    fn deterministic_choice_gives_up_after_bounded_retries() {
        let mut sampler = SetSampler::new(triangle_env(1), None, 8006);

        let subnet: Ipv4Prefix = "10.0.0.0/24".parse().unwrap();
        let mut forwarding = IndexMap::new();
        forwarding.insert(
            subnet,
            RouterGraph::from_edges(vec![("r1", "sink"), ("r2", "r1"), ("r3", "r2")]),
        );
        let mut source_counts = BTreeMap::new();
        source_counts.insert(subnet, BTreeMap::from([("r3".to_string(), 1usize)]));

        let view = SamplerView {
            forwarding: &forwarding,
            source_counts: &source_counts,
            provided: None,
        };

        let first = sampler.next_env(&view).unwrap().unwrap();
        assert_eq!(first.down_links().len(), 1);
        // the greedy pick does not change, so the second call collides
        // until it gives up
        assert!(sampler.next_env(&view).unwrap().is_none());
    }
}
