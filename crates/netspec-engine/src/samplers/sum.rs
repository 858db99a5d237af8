//! Coverage-weighted k-subset sampling.

use std::collections::BTreeSet;

use netspec_model::environment::{ConcreteEnvironment, Environment};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use tracing::debug;

use super::weight::WeightGraph;
use super::{Sampler, SamplerCore, SamplerView};
use crate::EngineError;

const MAX_TRIES: u32 = 100;

/// Draws k links without replacement, with probability proportional to
/// the aggregate Unknown-policy coverage of each link. After repeated
/// duplicate draws it falls back to the in-order unused-environment
/// walk.
#[derive(Debug, Clone)]
pub struct SumSampler {
    core: SamplerCore,
    graph: WeightGraph,
}

impl SumSampler {
    pub fn new(environment: Environment, max_samples: Option<u128>, seed: u64) -> Self {
        let graph = WeightGraph::new(&environment);
        SumSampler {
            core: SamplerCore::new(environment, max_samples, seed),
            graph,
        }
    }

    /// One weighted k-subset of links.
    fn draw_failed_links(&mut self, weights: &[u64]) -> BTreeSet<String> {
        let k = (self.core.environment().max_failures() as usize).min(self.graph.len());

        let mut candidates: Vec<usize> = (0..self.graph.len()).collect();
        let mut candidate_weights: Vec<u64> = weights.to_vec();
        let mut failed = BTreeSet::new();

        for _ in 0..k {
            let position = match WeightedIndex::new(candidate_weights.iter().copied()) {
                Ok(distribution) => distribution.sample(self.core.rng()),
                // all remaining weights are zero, fall back to uniform
                Err(_) => self.core.rng().gen_range(0..candidates.len()),
            };
            let edge = candidates.swap_remove(position);
            candidate_weights.swap_remove(position);
            failed.insert(self.graph.edge_name(edge).to_string());
        }

        failed
    }
}

impl Sampler for SumSampler {
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

        let weights = self.graph.policy_weights(view)?;

        for _ in 0..MAX_TRIES {
            let failed = self.draw_failed_links(&weights);
            let env = self.graph.concrete_env(&failed);
            if self.core.use_env(&env) {
                return Ok(Some(env));
            }
        }

        debug!("weighted draws kept colliding, walking the index instead");
        self.core.next_unused()
    }
}
