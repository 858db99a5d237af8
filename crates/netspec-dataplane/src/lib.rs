#![doc = include_str!("../README.md")]

//! Dataplane computation.
//!
//! The oracle hands back one FIB dump per concrete failure environment.
//! This crate parses the dump, partitions the address space into
//! forwarding equivalence classes, and builds one forwarding graph per
//! class together with the dominator graph of its reversed form rooted
//! at the traffic sink.

pub mod engine;
pub mod fec;
pub mod fib;
pub mod graph;

use netspec_model::ModelError;
use thiserror::Error;

/// Name of the virtual node all delivered traffic drains into.
pub const SINK: &str = "sink";

/// Next hop assigned to entries whose interface cannot be resolved.
pub const EXTERNAL: &str = "external";

/// Errors produced while computing the dataplane.
#[derive(Debug, Error)]
pub enum DataplaneError {
    /// A range was added to an equivalence class it neither overlaps
    /// nor abuts.
    #[error("range {first}-{last} is disjoint from class {class_first}-{class_last}")]
    DisjointRange {
        first: u32,
        last: u32,
        class_first: u32,
        class_last: u32,
    },
    #[error("malformed FIB entry: {0:?}")]
    MalformedFibEntry(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}
