//! Query encoding for the verification backend.
//!
//! A query asks whether a policy holds for a set of ingresses under
//! every environment the symbolic failure model admits. Isolation is
//! expressed as negated reachability; everything else maps one to one.

use std::fmt;

use indexmap::IndexMap;
use netspec_model::environment::Environment;
use netspec_model::policy::{PolicyDestination, PolicySource, PolicySpecifics, PolicyType};

/// One verification request.
#[derive(Debug, Clone)]
pub struct Query {
    pub policy_type: PolicyType,
    pub sources: Vec<PolicySource>,
    pub destination: PolicyDestination,
    pub specifics: PolicySpecifics,
    pub environment: Environment,
    pub negate: bool,
    attributes: IndexMap<&'static str, String>,
}

impl Query {
    pub fn new(
        policy_type: PolicyType,
        sources: Vec<PolicySource>,
        destination: PolicyDestination,
        specifics: PolicySpecifics,
        environment: Environment,
        negate: bool,
    ) -> Self {
        let mut query = Query {
            policy_type,
            sources,
            destination,
            specifics,
            environment,
            negate,
            attributes: IndexMap::new(),
        };
        query.build_attributes();
        query
    }

    /// The backend's name for this query type. Isolation rides on the
    /// reachability checker with the result negated.
    pub fn backend_type(&self) -> &'static str {
        match self.policy_type {
            PolicyType::Reachability | PolicyType::Isolation => "reachability",
            PolicyType::Waypoint => "waypoint",
            PolicyType::LoadBalancingSimple => "loadbalancing",
        }
    }

    fn build_attributes(&mut self) {
        let type_negate = matches!(self.policy_type, PolicyType::Isolation);

        let ingress = self
            .sources
            .iter()
            .map(|source| format!("^{source}$"))
            .collect::<Vec<_>>()
            .join("|");

        self.attributes.insert("IngressNodeRegex", ingress);
        self.attributes
            .insert("FinalNodeRegex", self.destination.router.clone());
        self.attributes
            .insert("FinalIfaceRegex", self.destination.interface.clone());
        self.attributes.insert(
            "Negate",
            if self.negate != type_negate { "True" } else { "False" }.to_string(),
        );
        self.attributes
            .insert("MaxFailures", self.environment.max_failures().to_string());
        self.attributes
            .insert("Environment", self.environment.polish_notation());

        match &self.specifics {
            PolicySpecifics::Waypoint(waypoint) => {
                self.attributes.insert("Waypoints", waypoint.clone());
            }
            PolicySpecifics::PathCount(paths) => {
                self.attributes.insert("NumPaths", paths.to_string());
            }
            PolicySpecifics::None => {}
        }
    }

    pub fn attributes(&self) -> &IndexMap<&'static str, String> {
        &self.attributes
    }

    /// The flat `Type:...;Key:value;` request string the backend reads.
    pub fn wire_string(&self) -> String {
        let mut output = format!("Type:{};", self.backend_type());
        for (key, value) in &self.attributes {
            output.push_str(key);
            output.push(':');
            output.push_str(value);
            output.push(';');
        }
        output
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} Query:", self.backend_type())?;
        for (key, value) in &self.attributes {
            writeln!(f, "\t{key}: {value}")?;
        }
        Ok(())
    }
}
