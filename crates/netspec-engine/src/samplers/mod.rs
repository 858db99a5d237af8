//! Concrete-environment samplers.
//!
//! Every sampler hands out unused [`ConcreteEnvironment`]s until it is
//! exhausted; no environment is ever returned twice. The scheduler
//! always takes the all-up baseline first, then drives one of the
//! variants: plain enumeration, uniform rejection sampling, or one of
//! the coverage-weighted heuristics that steer failures onto the links
//! the remaining Unknown policies depend on.

mod enumerate;
mod merge;
mod random;
mod set;
mod sum;
mod weight;

pub use enumerate::EnumerateSampler;
pub use merge::MergeSetSampler;
pub use random::RandomSampler;
pub use set::SetSampler;
pub use sum::SumSampler;

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use netspec_dataplane::graph::RouterGraph;
use netspec_model::environment::{ConcreteEnvironment, Environment};
use netspec_model::prefix::Ipv4Prefix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::EngineError;

/// Per-call context the coverage-weighted samplers read: the forwarding
/// graphs of the previous sample and the Unknown-policy source counts.
#[derive(Debug, Clone, Copy)]
pub struct SamplerView<'a> {
    pub forwarding: &'a IndexMap<Ipv4Prefix, RouterGraph>,
    pub source_counts: &'a BTreeMap<Ipv4Prefix, BTreeMap<String, usize>>,
    /// An externally suggested environment, honored only by samplers
    /// built with pass-through enabled.
    pub provided: Option<&'a ConcreteEnvironment>,
}

/// The sampler contract.
///
/// [`next_env`] returns `Ok(None)` once the sampler is exhausted; that
/// is a terminal condition, not an error.
///
/// [`next_env`]: Sampler::next_env
pub trait Sampler {
    fn core(&self) -> &SamplerCore;

    fn core_mut(&mut self) -> &mut SamplerCore;

    /// Draw the next unused environment.
    fn next_env(&mut self, view: &SamplerView<'_>)
        -> Result<Option<ConcreteEnvironment>, EngineError>;

    /// The all-up baseline, marked used.
    fn all_up(&mut self) -> Result<ConcreteEnvironment, EngineError> {
        self.core_mut().all_up()
    }

    /// Environments not yet handed out.
    fn remaining(&self) -> u128 {
        self.core().remaining()
    }
}

/// Bookkeeping shared by every sampler: the symbolic environment, the
/// seen-set, and the draw budget.
#[derive(Debug, Clone)]
pub struct SamplerCore {
    environment: Environment,
    rng: StdRng,
    used: HashSet<ConcreteEnvironment>,
    used_samples: u128,
    next_in_order: u128,
    max_samples: u128,
}

impl SamplerCore {
    /// `max_samples` caps the number of draws below the natural size of
    /// the environment space.
    pub fn new(environment: Environment, max_samples: Option<u128>, seed: u64) -> Self {
        let total = environment.env_count();
        SamplerCore {
            environment,
            rng: StdRng::seed_from_u64(seed),
            used: HashSet::new(),
            used_samples: 0,
            next_in_order: 0,
            max_samples: max_samples.map_or(total, |cap| cap.min(total)),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn total(&self) -> u128 {
        self.environment.env_count()
    }

    pub fn used_samples(&self) -> u128 {
        self.used_samples
    }

    pub fn remaining(&self) -> u128 {
        self.total() - self.used_samples
    }

    pub fn more_envs(&self) -> bool {
        self.used_samples < self.max_samples
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn seen(&self, env: &ConcreteEnvironment) -> bool {
        self.used.contains(env)
    }

    /// Mark an environment used. False when it had been handed out
    /// before.
    pub fn use_env(&mut self, env: &ConcreteEnvironment) -> bool {
        if self.used.contains(env) {
            return false;
        }
        self.used.insert(env.clone());
        self.used_samples += 1;
        true
    }

    pub fn all_up(&mut self) -> Result<ConcreteEnvironment, EngineError> {
        let env = self.environment.concrete_env(0)?;
        self.use_env(&env);
        Ok(env)
    }

    /// Walk the combinatorial index for the next unused environment.
    /// The fallback for weighted samplers that keep drawing duplicates.
    pub fn next_unused(&mut self) -> Result<Option<ConcreteEnvironment>, EngineError> {
        if !self.more_envs() {
            debug!("no unused environment left");
            return Ok(None);
        }
        while self.next_in_order < self.total() {
            let env = self.environment.concrete_env(self.next_in_order)?;
            self.next_in_order += 1;
            if self.use_env(&env) {
                return Ok(Some(env));
            }
        }
        debug!("combinatorial index exhausted");
        Ok(None)
    }
}
