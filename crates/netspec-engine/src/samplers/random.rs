//! Uniform rejection sampling over the combinatorial index.

use netspec_model::environment::{ConcreteEnvironment, Environment};
use rand::Rng;
use tracing::debug;

use super::{Sampler, SamplerCore, SamplerView};
use crate::EngineError;

const MAX_TRIES: u32 = 100;

/// Draws random index values and rejects duplicates, giving up after a
/// bounded number of collisions. Optionally passes an externally
/// provided environment through first.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    core: SamplerCore,
    use_provided: bool,
}

impl RandomSampler {
    pub fn new(environment: Environment, max_samples: Option<u128>, seed: u64) -> Self {
        RandomSampler {
            core: SamplerCore::new(environment, max_samples, seed),
            use_provided: false,
        }
    }

    /// Honor `SamplerView::provided` when it names an unused environment.
    pub fn with_provided_samples(mut self) -> Self {
        self.use_provided = true;
        self
    }
}

impl Sampler for RandomSampler {
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

        if self.use_provided {
            if let Some(provided) = view.provided {
                if !self.core.seen(provided) {
                    self.core.use_env(provided);
                    return Ok(Some(provided.clone()));
                }
            }
        }

        let total = self.core.total();
        for _ in 0..MAX_TRIES {
            let item = self.core.rng().gen_range(0..total);
            let env = self.core.environment().concrete_env(item)?;
            if self.core.use_env(&env) {
                return Ok(Some(env));
            }
        }
        debug!("kept drawing used environments, giving up");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::samplers::tests::{empty_view, triangle_env};

    #[test]
    fn draws_are_unique_until_exhaustion() {
        let mut sampler = RandomSampler::new(triangle_env(1), None, 8006);
        let (forwarding, counts) = empty_view();
        let view = SamplerView {
            forwarding: &forwarding,
            source_counts: &counts,
            provided: None,
        };

        let mut seen = vec![sampler.all_up().unwrap()];
        while let Some(env) = sampler.next_env(&view).unwrap() {
            assert!(!seen.contains(&env));
            seen.push(env);
        }
        // rejection sampling may give up early, but never repeats
        assert!(seen.len() <= 4);
    }

    #[test]
    fn provided_environments_pass_through_once() {
        let environment = triangle_env(1);
        let provided = environment.concrete_env(2).unwrap();

        let mut sampler =
            RandomSampler::new(environment, None, 8006).with_provided_samples();
        let (forwarding, counts) = empty_view();
        let view = SamplerView {
            forwarding: &forwarding,
            source_counts: &counts,
            provided: Some(&provided),
        };

        let first = sampler.next_env(&view).unwrap().unwrap();
        assert_eq!(first, provided);

        // the second draw must not replay the provided environment
        if let Some(second) = sampler.next_env(&view).unwrap() {
            assert_ne!(second, provided);
        }

        let down: BTreeSet<&str> = first.down_links().into_iter().collect();
        assert_eq!(down.len(), 1);
    }
}
