//! Parsing of raw backend responses.
//!
//! The backend answers in one of three shapes: the literal `Verified`,
//! a Batfish-style flow trace (`Flow: ingress:... vrf:...` sections with
//! an `edgeBlacklist=[...]` environment), or a generic counterexample
//! listing `link(a,b)` failures. Anything else is a malformed response.

use std::collections::BTreeSet;

use netspec_model::environment::ConcreteEnvironment;
use netspec_model::link::Link;
use netspec_model::policy::{PolicySource, PolicyStatus};
use regex::Regex;
use tracing::error;

use crate::query::Query;
use crate::OracleError;

/// Compiled counterexample grammars. Build once, parse many.
#[derive(Debug, Clone)]
pub struct ResponseGrammar {
    ingress: Regex,
    blacklist: Regex,
    blacklist_edge: Regex,
    generic_link: Regex,
}

impl ResponseGrammar {
    pub fn new() -> Result<Self, OracleError> {
        Ok(ResponseGrammar {
            ingress: Regex::new(r"ingress:(.+?) vrf:")?,
            blacklist: Regex::new(r"edgeBlacklist=\[(.*?)\]")?,
            blacklist_edge: Regex::new(r"<(.+?):(.+?),\s(.+?):(.+?)>")?,
            generic_link: Regex::new(r"link\((.+?),(.+?)\)")?,
        })
    }

    /// Parse a raw response in the context of the query that caused it.
    pub fn parse(&self, query: &Query, raw: &str) -> Result<Response, OracleError> {
        if raw.starts_with("Verified") {
            return Ok(Response {
                sources: query.sources.clone(),
                verdicts: vec![PolicyStatus::Holds; query.sources.len()],
                counterexample: None,
            });
        }

        let (failed_links, failing_routers) = if raw.starts_with("Flow:") {
            self.parse_flow_counterexample(raw)
        } else if raw.starts_with("Counterexample") {
            self.parse_generic_counterexample(raw)
        } else {
            return Err(OracleError::malformed(raw));
        };

        if failing_routers.is_empty() {
            return Err(OracleError::MissingIngress);
        }

        let counterexample = ConcreteEnvironment::from_failed_links(
            query.environment.links().map(|link| link.name.as_str()),
            &failed_links,
        );

        let verdicts = query
            .sources
            .iter()
            .map(|source| {
                if failing_routers.contains(source.0.as_str()) {
                    PolicyStatus::HoldsNot
                } else {
                    PolicyStatus::Unknown
                }
            })
            .collect();

        for router in &failing_routers {
            if !query.sources.iter().any(|source| source.0 == *router) {
                error!(%router, "counterexample ingress matches no query source");
            }
        }

        Ok(Response {
            sources: query.sources.clone(),
            verdicts,
            counterexample: Some(counterexample),
        })
    }

    /// Failed links and failing ingresses of a flow-trace counterexample.
    ///
    /// Sections are separated by blank lines; each carries the same
    /// environment, so blacklists are unioned across sections.
    pub fn parse_flow_counterexample(
        &self,
        message: &str,
    ) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut failed_links = BTreeSet::new();
        let mut failing_routers = BTreeSet::new();

        for section in message.split("\n\n") {
            let Some(ingress) = self.ingress.captures(section) else {
                continue;
            };
            failing_routers.insert(ingress[1].to_string());

            if let Some(blacklist) = self.blacklist.captures(section) {
                for edge in self.blacklist_edge.captures_iter(&blacklist[1]) {
                    failed_links.insert(Link::canonical_name(&edge[1], &edge[3]));
                }
            }
        }

        (failed_links, failing_routers)
    }

    /// Failed links of a generic counterexample. This grammar names no
    /// ingresses.
    pub fn parse_generic_counterexample(
        &self,
        message: &str,
    ) -> (BTreeSet<String>, BTreeSet<String>) {
        let failed_links = self
            .generic_link
            .captures_iter(message)
            .map(|edge| Link::canonical_name(&edge[1], &edge[2]))
            .collect();
        (failed_links, BTreeSet::new())
    }
}

/// A parsed backend answer: one verdict per query source, plus the
/// counterexample environment when the policy failed somewhere.
#[derive(Debug, Clone)]
pub struct Response {
    sources: Vec<PolicySource>,
    verdicts: Vec<PolicyStatus>,
    counterexample: Option<ConcreteEnvironment>,
}

impl Response {
    pub fn all_hold(&self) -> bool {
        self.verdicts
            .iter()
            .all(|status| *status == PolicyStatus::Holds)
    }

    pub fn counterexample(&self) -> Option<&ConcreteEnvironment> {
        self.counterexample.as_ref()
    }

    pub fn holding_sources(&self) -> Vec<&PolicySource> {
        self.sources_with(PolicyStatus::Holds)
    }

    pub fn failing_sources(&self) -> Vec<&PolicySource> {
        self.sources_with(PolicyStatus::HoldsNot)
    }

    fn sources_with(&self, status: PolicyStatus) -> Vec<&PolicySource> {
        self.sources
            .iter()
            .zip(&self.verdicts)
            .filter(|(_, verdict)| **verdict == status)
            .map(|(source, _)| source)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netspec_model::environment::Environment;
    use netspec_model::link::LinkState;
    use netspec_model::policy::{PolicyDestination, PolicySpecifics, PolicyType};
    use netspec_model::prefix::Ipv4Prefix;

    fn grid_edges() -> Vec<(&'static str, &'static str)> {
        vec![
            ("r1", "r2"), ("r1", "r6"), ("r2", "r3"), ("r2", "r7"), ("r3", "r4"),
            ("r3", "r8"), ("r4", "r5"), ("r4", "r9"), ("r5", "r10"), ("r6", "r7"),
            ("r6", "r11"), ("r7", "r8"), ("r7", "r12"), ("r8", "r9"), ("r8", "r13"),
            ("r9", "r10"), ("r9", "r14"), ("r10", "r15"), ("r11", "r12"), ("r11", "r16"),
            ("r12", "r13"), ("r12", "r17"), ("r13", "r14"), ("r13", "r18"), ("r14", "r15"),
            ("r14", "r19"), ("r15", "r20"), ("r16", "r17"), ("r16", "r21"), ("r17", "r18"),
            ("r17", "r22"), ("r18", "r19"), ("r18", "r23"), ("r19", "r20"), ("r19", "r24"),
            ("r20", "r25"), ("r21", "r22"), ("r22", "r23"), ("r23", "r24"), ("r24", "r25"),
        ]
    }

    fn grid_query(sources: &[&str]) -> Query {
        let links = grid_edges()
            .into_iter()
            .enumerate()
            .map(|(i, (a, b))| Link::with_state(format!("l{i}"), a, b, LinkState::Up));
        let subnet: Ipv4Prefix = "11.0.12.0/24".parse().unwrap();
        Query::new(
            PolicyType::LoadBalancingSimple,
            sources.iter().map(|s| PolicySource(s.to_string())).collect(),
            PolicyDestination::new("r12", "FastEthernet1/1", subnet),
            PolicySpecifics::PathCount(3),
            Environment::new(links),
            false,
        )
    }

    fn single_flow_message() -> String {
        "Flow: ingress:r12 vrf:default 0.0.0.0->11.15.10.2 HOPOPT packetLength:0 state:NEW\n\
         \x20 environment:BASE\n\
         Environment{testrigName=tempSnapshot, edgeBlacklist=[], interfaceBlacklist=null, \
         nodeBlacklist=null, bgpTables=null, routingTables=null, externalBgpAnnouncements=[]}\n\
         \x20   Hop 1: r12:FastEthernet0/0 -> r13:FastEthernet1/0\n\
         \x20   Hop 2: r13:FastEthernet0/0 -> r14:FastEthernet1/0\n\
         \x20   ACCEPTED\n\n"
            .to_string()
    }

    fn multi_flow_message() -> String {
        let blacklist = "edgeBlacklist=[<r11:FastEthernet0/1, r16:FastEthernet1/1>, \
                         <r12:FastEthernet0/0, r13:FastEthernet1/0>, \
                         <r2:FastEthernet1/0, r1:FastEthernet0/0>, \
                         <r6:FastEthernet0/0, r7:FastEthernet1/0>]";
        format!(
            "Flow: ingress:r15 vrf:default 0.0.0.0->11.12.7.2 HOPOPT packetLength:0 state:NEW\n\
             \x20 environment:BASE\n\
             Environment{{testrigName=tempSnapshot, {blacklist}, interfaceBlacklist=null}}\n\
             \x20   Hop 1: r15:FastEthernet1/1 -> r10:FastEthernet0/1\n\
             \x20   ACCEPTED\n\n\
             Flow: ingress:r6 vrf:default 0.0.0.0->11.12.7.2 HOPOPT packetLength:0 state:NEW\n\
             \x20 environment:BASE\n\
             Environment{{testrigName=tempSnapshotId, {blacklist}, interfaceBlacklist=null}}\n\
             \x20   Hop 1: r6:FastEthernet0/1 -> r11:FastEthernet1/1\n\
             \x20   ACCEPTED"
        )
    }

    fn generic_message() -> String {
        "Counterexample Found:\n\
         ==========================================\n\
         Packet:\n\
         ----------------------\n\
         dstIp: 11.12.7.2\n\n\
         Failures:\n\
         ----------------------\n\
         link(r1,r2)\n\
         link(r11,r16)\n\
         link(r3,r4)\n\
         =========================================="
            .to_string()
    }

    #[test]
    fn verified_marks_every_source_as_holding() {
        let grammar = ResponseGrammar::new().unwrap();
        let query = grid_query(&["r15", "r6"]);
        let response = grammar.parse(&query, "Verified").unwrap();
        assert!(response.all_hold());
        assert!(response.counterexample().is_none());
        assert_eq!(response.holding_sources().len(), 2);
    }

    #[test]
    fn flow_counterexample_with_empty_blacklist_names_its_ingress() {
        let grammar = ResponseGrammar::new().unwrap();
        let query = grid_query(&["r12"]);
        let response = grammar.parse(&query, &single_flow_message()).unwrap();

        assert!(!response.all_hold());
        let failing: Vec<&str> = response.failing_sources().iter().map(|s| s.0.as_str()).collect();
        assert_eq!(failing, vec!["r12"]);

        // empty blacklist: the counterexample is the all-up environment
        let counterexample = response.counterexample().unwrap();
        assert!(counterexample.down_links().is_empty());
        assert_eq!(counterexample.len(), grid_edges().len());
    }

    #[test]
    fn multi_flow_counterexamples_collect_every_ingress_and_link() {
        let grammar = ResponseGrammar::new().unwrap();
        let query = grid_query(&["r15", "r6"]);
        let response = grammar.parse(&query, &multi_flow_message()).unwrap();

        let mut failing: Vec<&str> =
            response.failing_sources().iter().map(|s| s.0.as_str()).collect();
        failing.sort_unstable();
        assert_eq!(failing, vec!["r15", "r6"]);

        let counterexample = response.counterexample().unwrap();
        let mut down = counterexample.down_links();
        down.sort_unstable();
        assert_eq!(down, vec!["r11=r16", "r12=r13", "r1=r2", "r6=r7"]);
    }

    #[test]
    fn generic_counterexamples_extract_failed_links_but_no_ingress() {
        let grammar = ResponseGrammar::new().unwrap();
        let (failed_links, failing_routers) =
            grammar.parse_generic_counterexample(&generic_message());

        assert!(failing_routers.is_empty());
        let expected: BTreeSet<String> =
            ["r1=r2", "r11=r16", "r3=r4"].iter().map(|s| s.to_string()).collect();
        assert_eq!(failed_links, expected);

        let query = grid_query(&["r6"]);
        assert!(matches!(
            grammar.parse(&query, &generic_message()),
            Err(OracleError::MissingIngress)
        ));
    }

    #[test]
    fn unknown_responses_are_malformed() {
        let grammar = ResponseGrammar::new().unwrap();
        let query = grid_query(&["r6"]);
        assert!(matches!(
            grammar.parse(&query, "segmentation fault"),
            Err(OracleError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn sources_absent_from_the_counterexample_stay_unknown() {
        let grammar = ResponseGrammar::new().unwrap();
        let query = grid_query(&["r12", "r9"]);
        let response = grammar.parse(&query, &single_flow_message()).unwrap();
        assert_eq!(response.failing_sources().len(), 1);
        assert!(response.holding_sources().is_empty());
    }
}
