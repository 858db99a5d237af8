//! End-to-end run on a small diamond network.
//!
//! Four routers in a cycle (r1-r2-r4-r3-r1) forward towards a loopback
//! subnet on r1; r5 and r6 are unwired. Under a one-failure budget the
//! reachability and isolation policies survive every environment, while
//! the ECMP load-balancing policy on r4 breaks as soon as one of its
//! two paths goes down. The run must converge to that partition no
//! matter how the scheduler interleaves sampling and verification.

use std::collections::BTreeMap;

use netspec_engine::guesser::PolicyGuesser;
use netspec_engine::pipeline::{Pipeline, PipelineConfig};
use netspec_engine::report::TerminationReason;
use netspec_engine::samplers::EnumerateSampler;
use netspec_model::environment::{ConcreteEnvironment, Environment};
use netspec_model::policy::{PolicyStatus, PolicyType};
use netspec_model::prefix::Ipv4Prefix;
use netspec_model::topology::{Interface, Router, Topology};
use netspec_oracle::client::VerificationOracle;
use netspec_oracle::query::Query;
use netspec_oracle::OracleError;

fn dst_subnet() -> Ipv4Prefix {
    "10.0.1.0/24".parse().unwrap()
}

fn diamond_topology() -> Topology {
    let mut topology = Topology::new("diamond");

    let interfaces = |names: &[&str]| -> Vec<Interface> {
        names.iter().map(|name| Interface::new(*name)).collect()
    };

    let mut r1 = interfaces(&["eth2", "eth3"]);
    r1.push(Interface::new("lo0").with_subnet(dst_subnet()));
    topology.add_router(Router::new("r1", r1, Vec::new()));
    topology.add_router(Router::new("r2", interfaces(&["eth1", "eth4"]), Vec::new()));
    topology.add_router(Router::new("r3", interfaces(&["eth1", "eth4"]), Vec::new()));
    topology.add_router(Router::new("r4", interfaces(&["eth2", "eth3"]), Vec::new()));
    topology.add_router(Router::new("r5", Vec::new(), Vec::new()));
    topology.add_router(Router::new("r6", Vec::new(), Vec::new()));

    for (a, b) in [("r1", "r2"), ("r1", "r3"), ("r2", "r4"), ("r3", "r4")] {
        topology.add_link(a, b, 1).unwrap();
        topology.add_link(b, a, 1).unwrap();
    }

    for (router, interface, next_hop) in [
        ("r1", "eth2", "r2"),
        ("r1", "eth3", "r3"),
        ("r2", "eth1", "r1"),
        ("r2", "eth4", "r4"),
        ("r3", "eth1", "r1"),
        ("r3", "eth4", "r4"),
        ("r4", "eth2", "r2"),
        ("r4", "eth3", "r3"),
    ] {
        topology.set_next_hop(router, interface, next_hop);
    }

    topology
}

/// Serves the true dataplane of every single-failure environment and
/// answers queries the way an exact verifier would.
struct TruthfulOracle {
    dumps: BTreeMap<Vec<String>, String>,
}

impl TruthfulOracle {
    fn new() -> Self {
        let mut dumps = BTreeMap::new();

        // all links up: r4 load-balances over both upstream paths
        dumps.insert(
            Vec::new(),
            fib_dump(&[
                ("r1", &[("lo0", "ConnectedRoute")]),
                ("r2", &[("eth1", "OspfRoute")]),
                ("r3", &[("eth1", "OspfRoute")]),
                ("r4", &[("eth2", "OspfRoute"), ("eth3", "OspfRoute")]),
            ]),
        );
        dumps.insert(
            vec!["r1=r2".to_string()],
            fib_dump(&[
                ("r1", &[("lo0", "ConnectedRoute")]),
                ("r2", &[("eth4", "OspfRoute")]),
                ("r3", &[("eth1", "OspfRoute")]),
                ("r4", &[("eth3", "OspfRoute")]),
            ]),
        );
        dumps.insert(
            vec!["r1=r3".to_string()],
            fib_dump(&[
                ("r1", &[("lo0", "ConnectedRoute")]),
                ("r2", &[("eth1", "OspfRoute")]),
                ("r3", &[("eth4", "OspfRoute")]),
                ("r4", &[("eth2", "OspfRoute")]),
            ]),
        );
        dumps.insert(
            vec!["r2=r4".to_string()],
            fib_dump(&[
                ("r1", &[("lo0", "ConnectedRoute")]),
                ("r2", &[("eth1", "OspfRoute")]),
                ("r3", &[("eth1", "OspfRoute")]),
                ("r4", &[("eth3", "OspfRoute")]),
            ]),
        );
        dumps.insert(
            vec!["r3=r4".to_string()],
            fib_dump(&[
                ("r1", &[("lo0", "ConnectedRoute")]),
                ("r2", &[("eth1", "OspfRoute")]),
                ("r3", &[("eth1", "OspfRoute")]),
                ("r4", &[("eth2", "OspfRoute")]),
            ]),
        );

        TruthfulOracle { dumps }
    }
}

fn fib_dump(routers: &[(&str, &[(&str, &str)])]) -> String {
    let mut dump = String::new();
    for (router, entries) in routers {
        dump.push_str(&format!("# Router:{router}\n## VRF:default\n"));
        for (interface, route_type) in *entries {
            dump.push_str(&format!("10.0.1.0/24;{interface};{route_type}\n"));
        }
    }
    dump
}

impl VerificationOracle for TruthfulOracle {
    fn dataplane(&mut self, environment: &ConcreteEnvironment) -> Result<String, OracleError> {
        let mut down: Vec<String> = environment
            .down_links()
            .into_iter()
            .map(str::to_string)
            .collect();
        down.sort();
        self.dumps
            .get(&down)
            .cloned()
            .ok_or_else(|| OracleError::Unavailable(format!("no dataplane for {down:?}")))
    }

    fn verify(&mut self, query: &Query) -> Result<String, OracleError> {
        match query.policy_type {
            // every router stays connected to r1 under one failure, and
            // the unwired ones stay isolated
            PolicyType::Reachability | PolicyType::Isolation | PolicyType::Waypoint => {
                Ok("Verified".to_string())
            }
            // losing r2=r4 leaves r4 a single path
            PolicyType::LoadBalancingSimple => Ok(concat!(
                "Flow: ingress:r4 vrf:default dst:10.0.1.1\n",
                "environment: edgeBlacklist=[<r2:eth4, r4:eth2>]\n",
            )
            .to_string()),
        }
    }
}

#[test]
fn diamond_run_converges_to_the_golden_partition() {
    let topology = diamond_topology();
    let environment = Environment::with_max_failures(topology.links(), 1);

    let sampler = EnumerateSampler::new(environment.clone(), None, 8006);
    let config = PipelineConfig {
        window_size: 2,
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(
        topology,
        environment,
        TruthfulOracle::new(),
        sampler,
        PolicyGuesser::new(),
        config,
    )
    .unwrap();

    let report = pipeline.run().unwrap();

    assert_eq!(report.termination, TerminationReason::PoliciesResolved);
    assert_eq!(report.counts.unknown, 0);
    assert_eq!(report.counts.holds, 5);
    assert_eq!(report.counts.holds_not, 1);

    let store = pipeline.store();
    assert_eq!(store.len(), 6);

    for (key, record) in store.records() {
        let expected = match (key.policy_type, key.source.0.as_str()) {
            (PolicyType::Reachability, "r2" | "r3" | "r4") => PolicyStatus::Holds,
            (PolicyType::Isolation, "r5" | "r6") => PolicyStatus::Holds,
            (PolicyType::LoadBalancingSimple, "r4") => PolicyStatus::HoldsNot,
            other => panic!("unexpected record {other:?}"),
        };
        assert_eq!(record.status(), expected, "status of {key:?}");
    }

    // the baseline plus at least one elimination sample were taken
    let samples = report
        .events
        .iter()
        .filter(|event| matches!(event, netspec_engine::report::StatsEvent::Sample { .. }))
        .count();
    assert!(samples >= 2);
}
