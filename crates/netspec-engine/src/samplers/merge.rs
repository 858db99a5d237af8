//! Greedy set-cover selection with duplicate-escape by mixing.

use std::collections::BTreeSet;

use netspec_model::environment::{ConcreteEnvironment, Environment};
use rand::seq::{IteratorRandom, SliceRandom};
use tracing::debug;

use super::set::best_uncovered_edge;
use super::weight::WeightGraph;
use super::{Sampler, SamplerCore, SamplerView};
use crate::EngineError;

const MAX_TRIES: u32 = 100;

/// Greedy coverage picks like [`super::SetSampler`], but a duplicate
/// draw is escaped by mixing one link from the previous sample's failed
/// set with one from the colliding draw, filled up randomly from their
/// union. Needs k > 1 to have anything to mix; below that it gives up.
#[derive(Debug, Clone)]
pub struct MergeSetSampler {
    core: SamplerCore,
    graph: WeightGraph,
    last_failed: Option<BTreeSet<String>>,
}

impl MergeSetSampler {
    pub fn new(environment: Environment, max_samples: Option<u128>, seed: u64) -> Self {
        let graph = WeightGraph::new(&environment);
        MergeSetSampler {
            core: SamplerCore::new(environment, max_samples, seed),
            graph,
            last_failed: None,
        }
    }

    /// Mix the previous failed set with the colliding one.
    fn mixed_failed_links(
        &mut self,
        colliding: &BTreeSet<String>,
        k: usize,
    ) -> Option<BTreeSet<String>> {
        let previous = self.last_failed.clone()?;

        let mut failed = BTreeSet::new();
        failed.insert(previous.iter().choose(self.core.rng())?.clone());
        failed.insert(colliding.iter().choose(self.core.rng())?.clone());

        let union: Vec<&String> = previous.union(colliding).collect();
        if failed.len() < k {
            let fill = k - failed.len();
            for link in union.choose_multiple(self.core.rng(), fill) {
                failed.insert((**link).clone());
            }
        }

        Some(failed)
    }
}

impl Sampler for MergeSetSampler {
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
                self.last_failed = Some(failed);
                return Ok(Some(env));
            }

            if tries > MAX_TRIES {
                debug!("could not escape duplicate draws, giving up");
                return Ok(None);
            }

            // mixing needs at least two failed links to recombine
            if k <= 1 {
                return Ok(None);
            }

            if let Some(mixed) = self.mixed_failed_links(&failed, k) {
                let env = self.graph.concrete_env(&mixed);
                if self.core.use_env(&env) {
                    self.last_failed = Some(mixed);
                    return Ok(Some(env));
                }
            }
        }
    }
}
