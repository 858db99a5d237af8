#![doc = include_str!("../README.md")]

//! Netspec data model.
//!
//! This crate defines the leaf types every other netspec crate builds on:
//! the combinatorial index that bijects flat integers to bounded-size
//! failure subsets, IPv4 prefixes, links with symbolic state, the network
//! topology interface, symbolic and concrete failure environments, and the
//! policy candidate vocabulary.

pub mod access_list;
pub mod combinatorics;
pub mod environment;
pub mod link;
pub mod policy;
pub mod prefix;
pub mod topology;

use thiserror::Error;

/// Errors produced by the data-model layer.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("environment item {item} out of range (environment count is {count})")]
    EnvironmentIndexOutOfRange { item: u128, count: u128 },
    #[error("unknown link: {0}")]
    UnknownLink(String),
    #[error("unknown router: {0}")]
    UnknownRouter(String),
    #[error("link {name} must be concretized to up or down, not {state:?}")]
    SymbolicLinkState {
        name: String,
        state: link::LinkState,
    },
    #[error("invalid IPv4 prefix: {0}")]
    InvalidPrefix(String),
}
