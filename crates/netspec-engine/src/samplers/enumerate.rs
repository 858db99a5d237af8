//! Deterministic walk through the combinatorial index.

use netspec_model::environment::{ConcreteEnvironment, Environment};
use tracing::debug;

use super::{Sampler, SamplerCore, SamplerView};
use crate::EngineError;

/// Hands out environments in index order: all-up first, then every
/// single failure, then every pair, and so on.
#[derive(Debug, Clone)]
pub struct EnumerateSampler {
    core: SamplerCore,
}

impl EnumerateSampler {
    pub fn new(environment: Environment, max_samples: Option<u128>, seed: u64) -> Self {
        EnumerateSampler {
            core: SamplerCore::new(environment, max_samples, seed),
        }
    }
}

impl Sampler for EnumerateSampler {
    fn core(&self) -> &SamplerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SamplerCore {
        &mut self.core
    }

    fn next_env(
        &mut self,
        _view: &SamplerView<'_>,
    ) -> Result<Option<ConcreteEnvironment>, EngineError> {
        if !self.core.more_envs() {
            debug!("no samples left");
            return Ok(None);
        }
        self.core.next_unused()
    }
}
