#![doc = include_str!("../README.md")]

//! Mining loop.
//!
//! The crate is organized around the scheduler in [`pipeline`]: it draws
//! concrete environments from a [`samplers::Sampler`], turns each
//! resulting dataplane into policy candidates via [`guesser`], folds them
//! into the [`store::HypothesisStore`], and spends the rest of its budget
//! on exact verification queries. [`report`] holds the serializable
//! result types a finished (or aborted) run exports.

pub mod guesser;
pub mod pipeline;
pub mod report;
pub mod samplers;
pub mod store;

use miette::Diagnostic;
use netspec_model::prefix::Ipv4Prefix;
use netspec_model::ModelError;
use thiserror::Error;

/// Errors inside the mining machinery.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    /// The store was queried before it absorbed the baseline sample.
    #[error("hypothesis store has not absorbed a baseline sample yet")]
    #[diagnostic(
        code(netspec::engine::uninitialized_store),
        help("merge the all-up baseline sample before querying the store")
    )]
    UninitializedStore,

    /// A weighted sampler needed a forwarding graph the last sample did
    /// not produce.
    #[error("no forwarding graph for subnet {0}")]
    #[diagnostic(code(netspec::engine::missing_forwarding_graph))]
    MissingForwardingGraph(Ipv4Prefix),

    #[error(transparent)]
    #[diagnostic(code(netspec::engine::model))]
    Model(#[from] ModelError),
}

/// Errors that abort a pipeline run. Partial results stay readable on
/// the pipeline after any of these.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Oracle(#[from] netspec_oracle::OracleError),

    #[error(transparent)]
    #[diagnostic(code(netspec::engine::dataplane))]
    Dataplane(#[from] netspec_dataplane::DataplaneError),
}
