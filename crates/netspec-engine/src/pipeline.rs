//! The adaptive sampling/verification scheduler.
//!
//! Each iteration branches on a running cost model rather than a fixed
//! state machine: as long as sampling eliminates policies at least as
//! fast as verification does, keep sampling (dense elimination); once
//! it falls behind, compare the projected total remaining time of each
//! strategy and pursue the cheaper one (sparse elimination). The first
//! time verification wins in the sparse branch, one static topological
//! trim pass runs instead of a query.

use std::time::Instant;

use indexmap::IndexMap;
use netspec_dataplane::engine::{dominator_graphs, DataplaneEngine};
use netspec_dataplane::graph::RouterGraph;
use netspec_model::environment::Environment;
use netspec_model::policy::{PolicyKey, PolicyStatus};
use netspec_model::prefix::Ipv4Prefix;
use netspec_model::topology::Topology;
use netspec_oracle::client::VerificationOracle;
use netspec_oracle::query::Query;
use netspec_oracle::response::ResponseGrammar;
use tracing::{debug, error, info};

use crate::guesser::PolicyGuesser;
use crate::report::{export_rows, RunReport, StatsEvent, StatusCounts, TerminationReason};
use crate::samplers::{Sampler, SamplerView};
use crate::store::HypothesisStore;
use crate::PipelineError;

/// Stand-in cost when a window eliminated nothing: effectively never
/// pick this strategy on rate alone.
const STALLED_COST: f64 = 1.0e7;

/// Trailing per-strategy timing over a fixed-size window.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window_size: usize,
    times: Vec<f64>,
    eliminated: Vec<u64>,
}

impl SlidingWindow {
    pub fn new(window_size: usize) -> Self {
        SlidingWindow {
            window_size,
            times: Vec::new(),
            eliminated: Vec::new(),
        }
    }

    fn tail(&self, values: &[f64]) -> f64 {
        values[values.len().saturating_sub(self.window_size)..]
            .iter()
            .sum()
    }

    /// Mean seconds per step over the trailing window; 0 before the
    /// first update.
    pub fn mean_time_per_item(&self) -> f64 {
        if self.times.is_empty() {
            return 0.0;
        }
        let tail_len = self.times.len().min(self.window_size);
        self.tail(&self.times) / tail_len as f64
    }

    /// Mean seconds per eliminated policy over the trailing window; 0
    /// before the first update, [`STALLED_COST`] when the window
    /// eliminated nothing.
    pub fn mean_time_per_policy(&self) -> f64 {
        if self.times.is_empty() {
            return 0.0;
        }
        let total_time = self.tail(&self.times);
        let start = self.eliminated.len().saturating_sub(self.window_size);
        let num_policies: u64 = self.eliminated[start..].iter().sum();
        if num_policies > 0 {
            total_time / num_policies as f64
        } else {
            STALLED_COST
        }
    }

    /// Projected time to process `num_steps` more steps.
    pub fn estimate_remaining_time(&self, num_steps: u128) -> f64 {
        let mean_time = self.mean_time_per_item();
        if mean_time > 0.0 {
            num_steps as f64 * mean_time
        } else {
            0.0
        }
    }

    pub fn update(&mut self, runtime: f64, num_eliminated: u64) {
        self.times.push(runtime);
        self.eliminated.push(num_eliminated);
    }

    pub fn full_window(&self) -> bool {
        self.times.len() >= self.window_size
    }
}

/// Knobs of one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// VRF whose FIB entries are read from each dump.
    pub vrf: String,
    /// Sliding-window length of the cost model.
    pub window_size: usize,
    /// Keep policies whose source is the destination router.
    pub node_local_reachability: bool,
    /// Run the one-shot topological trim pass.
    pub trim: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            vrf: "default".to_string(),
            window_size: 10,
            node_local_reachability: false,
            trim: true,
        }
    }
}

/// The mining loop: guesser, store, sampler, and oracle wired together.
pub struct Pipeline<O, S> {
    topology: Topology,
    environment: Environment,
    engine: DataplaneEngine,
    oracle: O,
    sampler: S,
    guesser: PolicyGuesser,
    grammar: ResponseGrammar,
    store: HypothesisStore,
    config: PipelineConfig,

    sampling_times: SlidingWindow,
    verification_times: SlidingWindow,

    prev_forwarding: IndexMap<Ipv4Prefix, RouterGraph>,
    prev_guess_size: Option<usize>,
    sample_counter: u64,
    events: Vec<StatsEvent>,
}

impl<O: VerificationOracle, S: Sampler> Pipeline<O, S> {
    pub fn new(
        topology: Topology,
        environment: Environment,
        oracle: O,
        sampler: S,
        guesser: PolicyGuesser,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let engine = DataplaneEngine::from_topology(&topology);
        let grammar = ResponseGrammar::new()?;
        Ok(Pipeline {
            topology,
            environment,
            engine,
            oracle,
            sampler,
            guesser,
            grammar,
            store: HypothesisStore::new(),
            sampling_times: SlidingWindow::new(config.window_size),
            verification_times: SlidingWindow::new(config.window_size),
            config,
            prev_forwarding: IndexMap::new(),
            prev_guess_size: None,
            sample_counter: 0,
            events: Vec::new(),
        })
    }

    /// The store with whatever the run established so far. Readable
    /// after a failed run too.
    pub fn store(&self) -> &HypothesisStore {
        &self.store
    }

    pub fn into_store(self) -> HypothesisStore {
        self.store
    }

    /// Run to completion. A dataplane or oracle failure aborts the run;
    /// partial results stay readable through [`store`].
    ///
    /// [`store`]: Pipeline::store
    pub fn run(&mut self) -> Result<RunReport, PipelineError> {
        info!("computing the baseline all-up sample");
        if !self.sample(true)? {
            self.store.finalize();
            return Ok(self.finish(TerminationReason::SamplerStalled, 0));
        }

        info!("warming up the verification cost window");
        while !self.verification_times.full_window() {
            if self.store.count(PolicyStatus::Unknown) == 0 {
                break;
            }
            self.verify()?;
        }

        info!("starting the elimination loop");
        let mut dense = true;
        let mut sparse_sampling = true;
        let mut trim_pending = self.config.trim;
        let mut steps: u64 = 0;

        let termination = loop {
            let remaining_samples = self.sampler.remaining();
            let remaining_policies = self.store.count(PolicyStatus::Unknown);

            if steps % 100 == 0 {
                info!(
                    steps,
                    remaining_samples = %remaining_samples,
                    remaining_policies,
                    "elimination progress"
                );
            }
            steps += 1;

            if remaining_policies == 0 {
                break TerminationReason::PoliciesResolved;
            }
            if remaining_samples == 0 {
                break TerminationReason::SamplesExhausted;
            }

            let sampling_cost = self.sampling_times.mean_time_per_policy();
            let verification_cost = self.verification_times.mean_time_per_policy();

            // dense elimination: sampling still pays for itself
            if sampling_cost <= verification_cost {
                if !dense {
                    info!("switching back to dense elimination");
                    dense = true;
                    self.events.push(StatsEvent::ModeSwitch { dense });
                }
                if !self.sample(false)? {
                    break TerminationReason::SamplerStalled;
                }
                continue;
            }

            // sparse elimination: pursue the cheaper projected total
            if dense {
                info!("switching to sparse elimination");
                dense = false;
                self.events.push(StatsEvent::ModeSwitch { dense });
            }

            let total_sampling = self.sampling_times.estimate_remaining_time(remaining_samples);
            let total_verification = self
                .verification_times
                .estimate_remaining_time(remaining_policies as u128);

            if total_sampling <= total_verification {
                if !sparse_sampling {
                    info!("sparse phase: back to sampling");
                    sparse_sampling = true;
                }
                if !self.sample(false)? {
                    break TerminationReason::SamplerStalled;
                }
            } else {
                if sparse_sampling {
                    info!("sparse phase: switching to verification");
                    sparse_sampling = false;
                }
                if trim_pending {
                    trim_pending = false;
                    self.trim();
                } else {
                    self.verify()?;
                }
            }
        };

        self.store.finalize();
        Ok(self.finish(termination, steps))
    }

    /// Sample one environment, build its dataplane, and merge the
    /// resulting candidates. False when the sampler has nothing left.
    fn sample(&mut self, first: bool) -> Result<bool, PipelineError> {
        let start = Instant::now();

        let env = if first {
            Some(self.sampler.all_up()?)
        } else {
            let source_counts = self.store.source_counts(PolicyStatus::Unknown)?;
            let view = SamplerView {
                forwarding: &self.prev_forwarding,
                source_counts: &source_counts,
                provided: None,
            };
            self.sampler.next_env(&view)?
        };

        let Some(env) = env else {
            error!("could not find another unused sample");
            return Ok(false);
        };

        debug!(%env, "building the sampled dataplane");
        let dump = self.oracle.dataplane(&env)?;
        let forwarding = self.engine.forwarding_graphs(&dump, &self.config.vrf)?;
        let dominators = dominator_graphs(&forwarding);

        let candidates = self.guesser.policies(
            &self.topology,
            &forwarding,
            &dominators,
            self.config.node_local_reachability,
        );
        let outcome = self.store.merge(candidates, self.sample_counter);
        self.sample_counter += 1;

        let eliminated = match self.prev_guess_size {
            Some(previous) => previous as i64 - outcome.guess_size as i64,
            None => -1,
        };
        self.prev_guess_size = Some(outcome.guess_size);
        self.prev_forwarding = forwarding;

        let duration = start.elapsed().as_secs_f64();
        if eliminated >= 0 {
            self.sampling_times.update(duration, eliminated as u64);
        }
        self.events.push(StatsEvent::Sample {
            duration_secs: duration,
            eliminated,
            guess_size: outcome.guess_size,
        });

        Ok(true)
    }

    /// Verify the next Unknown policy group against the oracle.
    fn verify(&mut self) -> Result<(), PipelineError> {
        let start = Instant::now();

        let Some(group) = self.store.next_query_group()? else {
            return Ok(());
        };

        let query = Query::new(
            group.policy_type,
            group.sources.clone(),
            group.destination.clone(),
            group.specifics.clone(),
            self.environment.clone(),
            false,
        );
        let raw = self.oracle.verify(&query)?;
        let response = self.grammar.parse(&query, &raw)?;

        let mut verified = 0;
        let mut violated = 0;
        for source in response.holding_sources() {
            let key = PolicyKey {
                policy_type: group.policy_type,
                subnet: group.subnet,
                specifics: group.specifics.clone(),
                source: source.clone(),
            };
            self.store.transition(&key, PolicyStatus::Holds);
            verified += 1;
        }
        for source in response.failing_sources() {
            let key = PolicyKey {
                policy_type: group.policy_type,
                subnet: group.subnet,
                specifics: group.specifics.clone(),
                source: source.clone(),
            };
            self.store.transition(&key, PolicyStatus::HoldsNot);
            violated += 1;
        }
        debug!(
            queried = group.sources.len(),
            verified, violated, "verification verdict applied"
        );

        let duration = start.elapsed().as_secs_f64();
        self.verification_times
            .update(duration, (verified + violated) as u64);
        self.events.push(StatsEvent::Verification {
            duration_secs: duration,
            verified,
            violated,
        });

        Ok(())
    }

    /// One static trim pass: demote policy pairs the topology cannot
    /// keep connected within the failure budget.
    fn trim(&mut self) {
        let budget = self.environment.max_failures();
        let connected = self.topology.k_connected_router_pairs(budget + 1);
        let removed = self.store.trim(&connected);
        debug!(removed, "trimmed topologically infeasible policies");
        self.events.push(StatsEvent::Trim { removed });
    }

    fn finish(&mut self, termination: TerminationReason, steps: u64) -> RunReport {
        let report = RunReport {
            termination,
            steps,
            counts: StatusCounts::of(&self.store),
            rows: export_rows(&self.store),
            events: std::mem::take(&mut self.events),
        };
        info!(
            holds = report.counts.holds,
            holds_not = report.counts.holds_not,
            ?termination,
            "run finished"
        );
        report
    }
}
