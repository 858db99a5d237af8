//! Policy candidate inference from one concrete dataplane.
//!
//! Given the per-class forwarding and dominator graphs of a single
//! sampled environment, the guesser proposes every policy that holds in
//! that environment: reachability for every source in the dominator
//! graph, isolation for every node outside it, simple load balancing
//! where multiple forwarding paths exist, and waypoint traversal for the
//! dominator-graph ancestors of each configured waypoint.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use netspec_dataplane::graph::RouterGraph;
use netspec_dataplane::SINK;
use netspec_model::policy::{
    PolicyCandidate, PolicyDestination, PolicySource, PolicySpecifics, PolicyType,
};
use netspec_model::prefix::Ipv4Prefix;
use netspec_model::topology::Topology;
use tracing::{debug, error};

/// Destination interfaces of one subnet, resolved against a forwarding
/// graph.
struct DestinationView {
    /// Every destination interface the subnet terminates at.
    all: BTreeSet<PolicyDestination>,
    /// For each node, the destinations it has a forwarding path to.
    per_node: BTreeMap<String, Vec<PolicyDestination>>,
    /// Routers directly attached to the destination subnet.
    dst_routers: BTreeSet<String>,
}

/// Proposes policy candidates from sampled forwarding state.
#[derive(Debug, Clone, Default)]
pub struct PolicyGuesser {
    waypoints: Vec<String>,
}

impl PolicyGuesser {
    pub fn new() -> Self {
        PolicyGuesser::default()
    }

    /// Waypoint candidates are only proposed for these routers.
    pub fn with_waypoints(waypoints: Vec<String>) -> Self {
        PolicyGuesser { waypoints }
    }

    /// All candidates the given dataplane supports. `node_local` keeps
    /// policies whose source is the destination router itself.
    pub fn policies(
        &self,
        topology: &Topology,
        forwarding: &IndexMap<Ipv4Prefix, RouterGraph>,
        dominators: &IndexMap<Ipv4Prefix, RouterGraph>,
        node_local: bool,
    ) -> Vec<PolicyCandidate> {
        let mut candidates = Vec::new();

        self.reachability_policies(&mut candidates, topology, forwarding, dominators, node_local);
        let num_reachability = candidates.len();

        self.loadbalancing_policies(&mut candidates, topology, forwarding, dominators, node_local);
        let num_loadbalancing = candidates.len() - num_reachability;

        if !self.waypoints.is_empty() {
            self.waypoint_policies(&mut candidates, topology, forwarding, dominators, node_local);
        }
        let num_waypoints = candidates.len() - num_loadbalancing - num_reachability;

        debug!(
            total = candidates.len(),
            num_reachability, num_loadbalancing, num_waypoints, "guessed policy candidates"
        );

        candidates
    }

    /// Reachability for every dominator-graph source, isolation for
    /// every node outside the dominator graph.
    pub fn reachability_policies(
        &self,
        candidates: &mut Vec<PolicyCandidate>,
        topology: &Topology,
        forwarding: &IndexMap<Ipv4Prefix, RouterGraph>,
        dominators: &IndexMap<Ipv4Prefix, RouterGraph>,
        node_local: bool,
    ) {
        let all_nodes: BTreeSet<&str> = topology.nodes().collect();

        for (subnet, graph) in dominators {
            let Some(fwd_graph) = forwarding.get(subnet) else {
                continue;
            };
            let view = self.destination_view(topology, subnet, fwd_graph);

            // Only subnets that terminate at a single interface count as
            // destinations; transit subnets between routers are skipped.
            if view.all.len() != 1 {
                continue;
            }

            let mut reachable: BTreeSet<&str> = graph.nodes().collect();
            let isolated: Vec<&str> = all_nodes.difference(&reachable).copied().collect();

            reachable.remove(SINK);
            if !node_local {
                for dst_router in &view.dst_routers {
                    reachable.remove(dst_router.as_str());
                }
            }

            for source in reachable {
                for destination in view.per_node.get(source).into_iter().flatten() {
                    candidates.push(PolicyCandidate::new(
                        PolicyType::Reachability,
                        destination.clone(),
                        PolicySpecifics::None,
                        PolicySource(source.to_string()),
                    ));
                }
            }

            for source in isolated {
                for destination in &view.all {
                    candidates.push(PolicyCandidate::new(
                        PolicyType::Isolation,
                        destination.clone(),
                        PolicySpecifics::None,
                        PolicySource(source.to_string()),
                    ));
                }
            }
        }
    }

    /// Simple load balancing: one candidate per node with more than one
    /// forwarding path to the destination, parameterized by the count.
    pub fn loadbalancing_policies(
        &self,
        candidates: &mut Vec<PolicyCandidate>,
        topology: &Topology,
        forwarding: &IndexMap<Ipv4Prefix, RouterGraph>,
        dominators: &IndexMap<Ipv4Prefix, RouterGraph>,
        node_local: bool,
    ) {
        for (subnet, graph) in dominators {
            let Some(fwd_graph) = forwarding.get(subnet) else {
                continue;
            };
            let view = self.destination_view(topology, subnet, fwd_graph);
            if view.all.len() > 1 {
                continue;
            }

            for node in graph.nodes() {
                if node == SINK || (!node_local && view.dst_routers.contains(node)) {
                    continue;
                }

                let destination = match view.per_node.get(node).map(Vec::as_slice) {
                    Some([destination]) => destination.clone(),
                    _ => {
                        error!(node, subnet = %subnet, "expected a single destination");
                        continue;
                    }
                };

                let all_paths = fwd_graph.simple_paths(node, SINK);
                if all_paths.len() > 1 {
                    candidates.push(PolicyCandidate::new(
                        PolicyType::LoadBalancingSimple,
                        destination,
                        PolicySpecifics::PathCount(all_paths.len()),
                        PolicySource(node.to_string()),
                    ));
                }
            }
        }
    }

    /// Waypoint candidates for every dominator-graph ancestor of each
    /// configured waypoint: traffic from those sources must cross it.
    pub fn waypoint_policies(
        &self,
        candidates: &mut Vec<PolicyCandidate>,
        topology: &Topology,
        forwarding: &IndexMap<Ipv4Prefix, RouterGraph>,
        dominators: &IndexMap<Ipv4Prefix, RouterGraph>,
        node_local: bool,
    ) {
        for (subnet, graph) in dominators {
            let Some(fwd_graph) = forwarding.get(subnet) else {
                continue;
            };
            let view = self.destination_view(topology, subnet, fwd_graph);
            if view.all.len() > 1 {
                continue;
            }

            for waypoint in &self.waypoints {
                if !graph.contains_node(waypoint) {
                    continue;
                }

                let mut pending = vec![waypoint.clone()];
                let mut sources = vec![waypoint.clone()];

                while let Some(current) = pending.pop() {
                    for predecessor in graph.in_neighbors(&current) {
                        pending.push(predecessor.to_string());
                        if node_local || !view.dst_routers.contains(predecessor) {
                            sources.push(predecessor.to_string());
                        }
                    }
                }

                for source in sources {
                    if view.dst_routers.contains(&source) {
                        continue;
                    }
                    for destination in view.per_node.get(&source).into_iter().flatten() {
                        candidates.push(PolicyCandidate::new(
                            PolicyType::Waypoint,
                            destination.clone(),
                            PolicySpecifics::Waypoint(waypoint.clone()),
                            PolicySource(source.clone()),
                        ));
                    }
                }
            }
        }
    }

    fn destination_view(
        &self,
        topology: &Topology,
        subnet: &Ipv4Prefix,
        fwd_graph: &RouterGraph,
    ) -> DestinationView {
        let mut view = DestinationView {
            all: BTreeSet::new(),
            per_node: BTreeMap::new(),
            dst_routers: BTreeSet::new(),
        };

        let mut interfaces = Vec::new();
        for router in fwd_graph.in_neighbors(SINK) {
            interfaces.extend(topology.interfaces_for_subnet(router, subnet));
        }

        for (dst_router, dst_interface) in interfaces {
            let destination = PolicyDestination::new(&dst_router, &dst_interface, *subnet);
            view.dst_routers.insert(dst_router.clone());
            view.all.insert(destination.clone());

            // Every node with a forwarding path to the destination
            // router, found by walking edges backwards from it.
            let mut seen = BTreeSet::new();
            let mut stack = vec![dst_router];
            while let Some(node) = stack.pop() {
                if !seen.insert(node.clone()) {
                    continue;
                }
                for predecessor in fwd_graph.in_neighbors(&node) {
                    stack.push(predecessor.to_string());
                }
                view.per_node.entry(node).or_default().push(destination.clone());
            }
        }

        view
    }
}
