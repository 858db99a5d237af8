//! Policy candidate vocabulary.
//!
//! A candidate is a `(type, destination, specifics, source)` tuple guessed
//! from one concrete dataplane; the hypothesis store keys records by the
//! destination's subnet rather than the full destination, collecting the
//! observed destination variants per record.

use std::fmt;

use serde::Serialize;

use crate::prefix::Ipv4Prefix;

/// Kinds of behavioral policies the guesser can propose.
///
/// Edge-disjoint and node-disjoint load balancing are deliberately
/// absent: no inference rule emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PolicyType {
    Reachability,
    Isolation,
    Waypoint,
    LoadBalancingSimple,
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyType::Reachability => "reachability",
            PolicyType::Isolation => "isolation",
            PolicyType::Waypoint => "waypoint",
            PolicyType::LoadBalancingSimple => "loadbalancing",
        };
        f.write_str(name)
    }
}

/// Verification status of a policy hypothesis.
///
/// `HoldsNot` is absorbing: once a counterexample demotes a record it
/// never becomes `Holds` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PolicyStatus {
    Unknown,
    Holds,
    HoldsNot,
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyStatus::Unknown => "unknown",
            PolicyStatus::Holds => "holds",
            PolicyStatus::HoldsNot => "holdsnot",
        };
        f.write_str(name)
    }
}

/// The ingress router a policy constrains.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PolicySource(pub String);

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where traffic must end up: an interface on a router, carrying a subnet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PolicyDestination {
    pub router: String,
    pub interface: String,
    pub subnet: Ipv4Prefix,
}

impl PolicyDestination {
    pub fn new(
        router: impl Into<String>,
        interface: impl Into<String>,
        subnet: Ipv4Prefix,
    ) -> Self {
        PolicyDestination {
            router: router.into(),
            interface: interface.into(),
            subnet,
        }
    }
}

impl fmt::Display for PolicyDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.router, self.interface, self.subnet)
    }
}

/// Type-specific policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PolicySpecifics {
    None,
    /// Mandatory waypoint router.
    Waypoint(String),
    /// Number of simple paths a load-balancing policy requires.
    PathCount(usize),
}

impl fmt::Display for PolicySpecifics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicySpecifics::None => f.write_str("-"),
            PolicySpecifics::Waypoint(w) => write!(f, "waypoint:{w}"),
            PolicySpecifics::PathCount(n) => write!(f, "paths:{n}"),
        }
    }
}

/// Composite key the hypothesis store indexes records by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PolicyKey {
    pub policy_type: PolicyType,
    pub subnet: Ipv4Prefix,
    pub specifics: PolicySpecifics,
    pub source: PolicySource,
}

/// One inferred candidate policy from a single sampled dataplane.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyCandidate {
    pub policy_type: PolicyType,
    pub destination: PolicyDestination,
    pub specifics: PolicySpecifics,
    pub source: PolicySource,
}

impl PolicyCandidate {
    pub fn new(
        policy_type: PolicyType,
        destination: PolicyDestination,
        specifics: PolicySpecifics,
        source: PolicySource,
    ) -> Self {
        PolicyCandidate {
            policy_type,
            destination,
            specifics,
            source,
        }
    }

    /// The store key this candidate contributes to.
    pub fn key(&self) -> PolicyKey {
        PolicyKey {
            policy_type: self.policy_type,
            subnet: self.destination.subnet,
            specifics: self.specifics.clone(),
            source: self.source.clone(),
        }
    }
}

impl fmt::Display for PolicyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} policy: {} -> {} [{}]",
            self.policy_type, self.source, self.destination, self.specifics
        )
    }
}
