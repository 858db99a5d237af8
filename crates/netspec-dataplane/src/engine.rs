//! FIB dump parsing and graph construction.
//!
//! The oracle emits one FIB dump per concrete environment. The dump is
//! a flat text format: `# Router:<name>` opens a router section,
//! `## VRF:<name>` a VRF within it, and every other non-empty line is a
//! `prefix;interface;routeType` forwarding entry.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use netspec_model::prefix::Ipv4Prefix;
use netspec_model::topology::Topology;
use tracing::{debug, error};

use crate::fec::PrefixTrie;
use crate::fib::RoutingTable;
use crate::graph::RouterGraph;
use crate::{DataplaneError, EXTERNAL, SINK};

/// Builds per-destination forwarding graphs from FIB dumps.
#[derive(Debug, Clone)]
pub struct DataplaneEngine {
    nodes: Vec<String>,
    next_hops: BTreeMap<(String, String), String>,
    blocked: BTreeMap<Ipv4Prefix, Vec<(String, String)>>,
}

impl DataplaneEngine {
    pub fn new(
        nodes: Vec<String>,
        next_hops: BTreeMap<(String, String), String>,
        blocked: BTreeMap<Ipv4Prefix, Vec<(String, String)>>,
    ) -> Self {
        DataplaneEngine {
            nodes,
            next_hops,
            blocked,
        }
    }

    pub fn from_topology(topology: &Topology) -> Self {
        DataplaneEngine::new(
            topology.nodes().map(str::to_string).collect(),
            topology.next_hops().clone(),
            topology.blocked_edge_index().clone(),
        )
    }

    /// Parse a FIB dump and build one forwarding graph per equivalence
    /// class, keyed by the class's covering prefix. Classes whose graph
    /// ends up without edges are dropped.
    pub fn forwarding_graphs(
        &self,
        dump: &str,
        vrf: &str,
    ) -> Result<IndexMap<Ipv4Prefix, RouterGraph>, DataplaneError> {
        let (fibs, trie) = self.parse_dump(dump, vrf)?;

        let mut graphs = IndexMap::new();
        for class in trie.partition()? {
            let Some(prefix) = class.covering_prefix() else {
                continue;
            };
            let graph = self.build_forwarding_graph(&prefix, &fibs);
            if graph.edge_count() > 0 {
                graphs.insert(prefix, graph);
            } else {
                debug!(%prefix, "no forwarding graph for class");
            }
        }
        Ok(graphs)
    }

    fn parse_dump(
        &self,
        dump: &str,
        vrf: &str,
    ) -> Result<(BTreeMap<String, RoutingTable>, PrefixTrie), DataplaneError> {
        let mut fibs: BTreeMap<String, RoutingTable> = BTreeMap::new();
        let mut trie = PrefixTrie::new();

        let mut router = "unknown".to_string();
        let mut current_vrf = "unknown".to_string();

        for line in dump.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(name) = line.strip_prefix("## VRF:") {
                current_vrf = name.to_string();
            } else if let Some(name) = line.strip_prefix("# Router:") {
                router = name.to_string();
                current_vrf = "unknown".to_string();
            } else if current_vrf == vrf {
                let mut fields = line.splitn(3, ';');
                let (Some(raw_prefix), Some(interface), Some(route_type)) =
                    (fields.next(), fields.next(), fields.next())
                else {
                    return Err(DataplaneError::MalformedFibEntry(line.to_string()));
                };

                let prefix: Ipv4Prefix = raw_prefix.parse()?;
                trie.insert(&prefix);

                let next_hop = if route_type == "ConnectedRoute" {
                    SINK.to_string()
                } else if interface == "null_interface" {
                    // blackholed
                    continue;
                } else if let Some(next_hop) = self
                    .next_hops
                    .get(&(router.clone(), interface.to_string()))
                {
                    next_hop.clone()
                } else {
                    error!(%prefix, %router, interface, "unresolved interface in FIB entry");
                    EXTERNAL.to_string()
                };

                fibs.entry(router.clone()).or_default().add_entry(
                    prefix,
                    interface,
                    route_type,
                    next_hop,
                );
            }
        }

        Ok((fibs, trie))
    }

    fn build_forwarding_graph(
        &self,
        prefix: &Ipv4Prefix,
        fibs: &BTreeMap<String, RoutingTable>,
    ) -> RouterGraph {
        let mut graph = RouterGraph::new();

        for router in &self.nodes {
            graph.ensure_node(router);

            let next_hops = fibs
                .get(router)
                .map(|fib| fib.next_hops(prefix))
                .unwrap_or_default();
            if next_hops.is_empty() {
                debug!(%router, %prefix, "router has no route towards prefix");
            }
            for next_hop in next_hops {
                graph.add_edge(router, next_hop);
            }
        }

        for (src, dst) in self.blocked_edges(prefix) {
            if graph.remove_edge(src, dst) {
                debug!(%src, %dst, %prefix, "removed ACL-blocked edge");
            }
        }

        graph
    }

    /// Blocked edges of the most specific blocked prefix containing
    /// `prefix`.
    fn blocked_edges(&self, prefix: &Ipv4Prefix) -> &[(String, String)] {
        self.blocked
            .iter()
            .filter(|(blocked, _)| blocked.contains(prefix))
            .max_by_key(|(blocked, _)| blocked.length())
            .map(|(_, edges)| edges.as_slice())
            .unwrap_or(&[])
    }
}

/// Dominator graph of each forwarding graph: every router points at its
/// immediate dominator on the way to the sink. Graphs without the sink
/// are skipped.
pub fn dominator_graphs(
    forwarding_graphs: &IndexMap<Ipv4Prefix, RouterGraph>,
) -> IndexMap<Ipv4Prefix, RouterGraph> {
    let mut dominator_graphs = IndexMap::new();
    for (subnet, forwarding_graph) in forwarding_graphs {
        let reversed = forwarding_graph.reversed();
        match reversed.immediate_dominators(SINK) {
            Some(pairs) => {
                dominator_graphs.insert(
                    *subnet,
                    RouterGraph::from_edges(
                        pairs.iter().map(|(node, idom)| (node.as_str(), idom.as_str())),
                    ),
                );
            }
            None => {
                error!(%subnet, "sink is not in the forwarding graph");
            }
        }
    }
    dominator_graphs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Prefix {
        s.parse().unwrap()
    }

    /// Eight routers with a single destination class; (r2, r6) carries
    /// a blocking ACL.
    fn simple_fixture() -> (Ipv4Prefix, DataplaneEngine, BTreeMap<String, RoutingTable>) {
        let prefix = net("19.89.12.0/24");
        let adjacency: [(&str, &[&str]); 8] = [
            ("r1", &[SINK]),
            ("r2", &[]),
            ("r3", &["r6"]),
            ("r4", &["r2"]),
            ("r5", &["r1"]),
            ("r6", &["r2"]),
            ("r7", &["r5"]),
            ("r8", &["r5", "r1"]),
        ];

        let mut fibs: BTreeMap<String, RoutingTable> = BTreeMap::new();
        let mut nodes = Vec::new();
        for (router, neighbors) in adjacency {
            nodes.push(router.to_string());
            let fib = fibs.entry(router.to_string()).or_default();
            for neighbor in neighbors {
                fib.add_entry(prefix, "FastEthernet0/0", "OspfRoute", *neighbor);
            }
        }

        let blocked = BTreeMap::from([(
            prefix,
            vec![("r2".to_string(), "r6".to_string())],
        )]);
        let engine = DataplaneEngine::new(nodes, BTreeMap::new(), blocked);
        (prefix, engine, fibs)
    }

    #[test]
    fn forwarding_graph_follows_the_fib_adjacency() {
        let (prefix, engine, fibs) = simple_fixture();
        let graph = engine.build_forwarding_graph(&prefix, &fibs);

        let mut edges: Vec<(&str, &str)> = graph.edges().collect();
        edges.sort();
        assert_eq!(
            edges,
            vec![
                ("r1", SINK),
                ("r3", "r6"),
                ("r4", "r2"),
                ("r5", "r1"),
                ("r6", "r2"),
                ("r7", "r5"),
                ("r8", "r1"),
                ("r8", "r5"),
            ]
        );
    }

    #[test]
    fn dominator_graph_only_holds_routers_that_reach_the_sink() {
        let (prefix, engine, fibs) = simple_fixture();
        let graph = engine.build_forwarding_graph(&prefix, &fibs);
        let forwarding_graphs = IndexMap::from([(prefix, graph)]);

        let dominator_graphs = dominator_graphs(&forwarding_graphs);
        let mut edges: Vec<(&str, &str)> = dominator_graphs[&prefix].edges().collect();
        edges.sort();
        assert_eq!(
            edges,
            vec![("r1", SINK), ("r5", "r1"), ("r7", "r5"), ("r8", "r1")]
        );
    }

    #[test]
    fn graphs_without_a_sink_are_dropped_from_the_dominator_map() {
        let prefix = net("10.0.0.0/8");
        let graph = RouterGraph::from_edges([("r1", "r2")]);
        let forwarding_graphs = IndexMap::from([(prefix, graph)]);
        assert!(dominator_graphs(&forwarding_graphs).is_empty());
    }

    #[test]
    fn dump_parsing_resolves_interfaces_and_filters_vrfs() {
        let engine = DataplaneEngine::new(
            vec!["r1".to_string(), "r2".to_string()],
            BTreeMap::from([
                (("r1".to_string(), "eth0".to_string()), "r2".to_string()),
                (("r2".to_string(), "eth0".to_string()), "r1".to_string()),
            ]),
            BTreeMap::new(),
        );

        let dump = "\
# Router:r1
## VRF:default
10.0.0.0/8;eth0;OspfRoute
10.0.0.0/8;bogus0;OspfRoute
## VRF:mgmt
192.168.0.0/16;eth0;OspfRoute
# Router:r2
## VRF:default
10.0.0.0/8;Loopback0;ConnectedRoute
10.1.0.0/16;null_interface;NullRoute
";

        let graphs = engine.forwarding_graphs(dump, "default").unwrap();

        // the /16 splits the /8's class in three; the mgmt prefix is gone
        let mut prefixes: Vec<Ipv4Prefix> = graphs.keys().copied().collect();
        prefixes.sort();
        assert_eq!(
            prefixes,
            vec![net("10.0.0.0/16"), net("10.1.0.0/16"), net("10.2.0.0/15")]
        );

        for graph in graphs.values() {
            let mut edges: Vec<(&str, &str)> = graph.edges().collect();
            edges.sort();
            assert_eq!(
                edges,
                vec![("r1", EXTERNAL), ("r1", "r2"), ("r2", SINK)]
            );
        }
    }

    #[test]
    fn malformed_entries_are_reported() {
        let engine = DataplaneEngine::new(vec!["r1".to_string()], BTreeMap::new(), BTreeMap::new());
        let dump = "# Router:r1\n## VRF:default\n10.0.0.0/8;eth0\n";
        assert!(matches!(
            engine.forwarding_graphs(dump, "default"),
            Err(DataplaneError::MalformedFibEntry(_))
        ));
    }

    #[test]
    fn acl_blocked_edges_are_severed_per_class() {
        let engine = DataplaneEngine::new(
            vec!["r1".to_string(), "r2".to_string()],
            BTreeMap::from([(("r1".to_string(), "eth0".to_string()), "r2".to_string())]),
            BTreeMap::from([(
                net("10.1.0.0/16"),
                vec![("r1".to_string(), "r2".to_string())],
            )]),
        );

        let dump = "\
# Router:r1
## VRF:default
10.0.0.0/8;eth0;OspfRoute
10.1.0.0/16;eth0;OspfRoute
# Router:r2
## VRF:default
10.0.0.0/8;Loopback0;ConnectedRoute
";

        let graphs = engine.forwarding_graphs(dump, "default").unwrap();
        assert!(!graphs[&net("10.1.0.0/16")].has_edge("r1", "r2"));
        assert!(graphs[&net("10.0.0.0/16")].has_edge("r1", "r2"));
    }
}
