#![doc = include_str!("../README.md")]

//! Oracle boundary.
//!
//! The engine never talks to the verification backend directly; it goes
//! through [`client::VerificationOracle`]. This crate owns the wire
//! formats on both sides of that trait: [`query::Query`] for requests
//! and [`response::Response`] for parsed answers.

pub mod client;
pub mod query;
pub mod response;

use miette::Diagnostic;
use thiserror::Error;

/// Errors at the oracle boundary.
#[derive(Debug, Error, Diagnostic)]
pub enum OracleError {
    /// The backend could not be reached or failed outright.
    #[error("verification backend unavailable: {0}")]
    #[diagnostic(code(netspec::oracle::unavailable))]
    Unavailable(String),

    /// The backend answered with something no grammar recognizes.
    #[error("unrecognized oracle response: {snippet:?}")]
    #[diagnostic(
        code(netspec::oracle::malformed_response),
        help("responses must start with 'Verified', 'Flow:' or 'Counterexample'")
    )]
    MalformedResponse { snippet: String },

    /// A counterexample matched a grammar but named no ingress.
    #[error("counterexample names no failing ingress")]
    #[diagnostic(code(netspec::oracle::missing_ingress))]
    MissingIngress,

    #[error("invalid counterexample grammar")]
    #[diagnostic(code(netspec::oracle::grammar))]
    Grammar(#[from] regex::Error),
}

impl OracleError {
    /// Truncate a raw response into an error-sized snippet.
    pub(crate) fn malformed(raw: &str) -> Self {
        let snippet: String = raw.chars().take(80).collect();
        OracleError::MalformedResponse { snippet }
    }
}
