//! Static network topology: routers, interfaces, links, and the
//! derived indexes the dataplane engine consumes.
//!
//! The topology is configuration-time data. Which links are up or down
//! in a particular state lives in [`crate::environment`]; this module only
//! knows the physical graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use indexmap::IndexMap;
use tracing::debug;

use crate::access_list::{AccessList, AclAction};
use crate::link::{Link, LinkState};
use crate::prefix::Ipv4Prefix;
use crate::ModelError;

/// A router interface with its addressed subnet and attached ACLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub subnet: Option<Ipv4Prefix>,
    pub ospf_cost: u64,
    pub access_group_in: Option<String>,
    pub access_group_out: Option<String>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Interface {
            name: name.into(),
            subnet: None,
            ospf_cost: 1,
            access_group_in: None,
            access_group_out: None,
        }
    }

    pub fn with_subnet(mut self, subnet: Ipv4Prefix) -> Self {
        self.subnet = Some(subnet);
        self
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.ospf_cost = cost;
        self
    }

    pub fn with_access_group_in(mut self, acl: impl Into<String>) -> Self {
        self.access_group_in = Some(acl.into());
        self
    }

    pub fn with_access_group_out(mut self, acl: impl Into<String>) -> Self {
        self.access_group_out = Some(acl.into());
        self
    }
}

/// A router: a named bag of interfaces and access lists.
#[derive(Debug, Clone)]
pub struct Router {
    pub name: String,
    pub interfaces: IndexMap<String, Interface>,
    pub access_lists: IndexMap<String, AccessList>,
}

impl Router {
    pub fn new(
        name: impl Into<String>,
        interfaces: impl IntoIterator<Item = Interface>,
        access_lists: impl IntoIterator<Item = AccessList>,
    ) -> Self {
        Router {
            name: name.into(),
            interfaces: interfaces
                .into_iter()
                .map(|i| (i.name.clone(), i))
                .collect(),
            access_lists: access_lists
                .into_iter()
                .map(|a| (a.name().to_string(), a))
                .collect(),
        }
    }
}

/// Attributes of one directed adjacency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeAttrs {
    pub cost: u64,
    pub state: LinkState,
    pub interface: Option<String>,
}

/// The physical network graph plus the indexes derived from it.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    name: String,
    routers: IndexMap<String, Router>,
    /// Directed adjacencies keyed by (src, dst).
    edges: BTreeMap<(String, String), EdgeAttrs>,
    /// (router, interface) to the neighboring router on that wire.
    next_hops: BTreeMap<(String, String), String>,
    /// Per router, the subnets its interfaces sit on.
    subnets: BTreeMap<String, BTreeMap<Ipv4Prefix, Vec<(String, String)>>>,
    /// Destination prefix to the directed edges on which traffic towards
    /// it is dropped by an interface ACL.
    blocked: BTreeMap<Ipv4Prefix, Vec<(String, String)>>,
}

impl Topology {
    pub fn new(name: impl Into<String>) -> Self {
        Topology {
            name: name.into(),
            ..Topology::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_router(&mut self, router: Router) {
        let subnet_index = self.subnets.entry(router.name.clone()).or_default();
        for interface in router.interfaces.values() {
            if let Some(subnet) = interface.subnet {
                subnet_index
                    .entry(subnet)
                    .or_default()
                    .push((router.name.clone(), interface.name.clone()));
            }
        }
        self.routers.insert(router.name.clone(), router);
    }

    /// Add a directed adjacency. Both routers must already exist.
    pub fn add_link(&mut self, src: &str, dst: &str, cost: u64) -> Result<(), ModelError> {
        for router in [src, dst] {
            if !self.routers.contains_key(router) {
                return Err(ModelError::UnknownRouter(router.to_string()));
            }
        }
        self.edges.insert(
            (src.to_string(), dst.to_string()),
            EdgeAttrs {
                cost,
                state: LinkState::Up,
                interface: None,
            },
        );
        Ok(())
    }

    pub fn set_edge_interface(
        &mut self,
        src: &str,
        dst: &str,
        interface: impl Into<String>,
    ) -> Result<(), ModelError> {
        let attrs = self
            .edges
            .get_mut(&(src.to_string(), dst.to_string()))
            .ok_or_else(|| ModelError::UnknownLink(Link::canonical_name(src, dst)))?;
        attrs.interface = Some(interface.into());
        Ok(())
    }

    pub fn set_next_hop(
        &mut self,
        router: impl Into<String>,
        interface: impl Into<String>,
        next_hop: impl Into<String>,
    ) {
        self.next_hops
            .insert((router.into(), interface.into()), next_hop.into());
    }

    pub fn next_hop(&self, router: &str, interface: &str) -> Option<&str> {
        self.next_hops
            .get(&(router.to_string(), interface.to_string()))
            .map(String::as_str)
    }

    pub fn next_hops(&self) -> &BTreeMap<(String, String), String> {
        &self.next_hops
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.routers.keys().map(String::as_str)
    }

    pub fn num_nodes(&self) -> usize {
        self.routers.len()
    }

    pub fn router(&self, name: &str) -> Option<&Router> {
        self.routers.get(name)
    }

    /// Every adjacency collapsed to canonical unordered pairs.
    pub fn undirected_edges(&self) -> BTreeSet<(String, String)> {
        self.edges
            .keys()
            .map(|(a, b)| {
                if a <= b {
                    (a.clone(), b.clone())
                } else {
                    (b.clone(), a.clone())
                }
            })
            .collect()
    }

    /// The failable links, with stable ids assigned in canonical order.
    pub fn links(&self) -> Vec<Link> {
        self.undirected_edges()
            .into_iter()
            .enumerate()
            .map(|(i, (a, b))| Link::new(format!("l{i}"), a, b))
            .collect()
    }

    /// Interfaces of `router` on the most specific of its subnets
    /// containing `subnet`. Empty when none does.
    pub fn interfaces_for_subnet(&self, router: &str, subnet: &Ipv4Prefix) -> Vec<(String, String)> {
        let Some(index) = self.subnets.get(router) else {
            return Vec::new();
        };
        index
            .iter()
            .filter(|(prefix, _)| prefix.contains(subnet))
            .max_by_key(|(prefix, _)| prefix.length())
            .map(|(_, intfs)| intfs.clone())
            .unwrap_or_default()
    }

    pub fn add_blocked_edge(&mut self, prefix: Ipv4Prefix, edge: (String, String)) {
        self.blocked.entry(prefix).or_default().push(edge);
    }

    /// Edges dropping traffic towards `prefix`, from the most specific
    /// blocked-prefix entry containing it.
    pub fn blocked_edges(&self, prefix: &Ipv4Prefix) -> &[(String, String)] {
        self.blocked
            .iter()
            .filter(|(blocked_prefix, _)| blocked_prefix.contains(prefix))
            .max_by_key(|(blocked_prefix, _)| blocked_prefix.length())
            .map(|(_, edges)| edges.as_slice())
            .unwrap_or(&[])
    }

    pub fn blocked_edge_index(&self) -> &BTreeMap<Ipv4Prefix, Vec<(String, String)>> {
        &self.blocked
    }

    /// Wire up interfaces that sit on the same subnet.
    ///
    /// Exactly two interfaces on a subnet get a bidirectional adjacency
    /// and next-hop entries; any other count is left alone. Afterwards,
    /// interface ACL entries that deny all sources towards some prefix
    /// become blocked-edge entries for that prefix.
    pub fn connect_interfaces(&mut self) -> Result<(), ModelError> {
        let mut by_subnet: BTreeMap<u32, Vec<(String, String, u64)>> = BTreeMap::new();
        for router in self.routers.values() {
            for interface in router.interfaces.values() {
                if let Some(subnet) = interface.subnet {
                    by_subnet.entry(subnet.network()).or_default().push((
                        router.name.clone(),
                        interface.name.clone(),
                        interface.ospf_cost,
                    ));
                }
            }
        }

        for (network, mut ends) in by_subnet {
            if ends.len() != 2 {
                debug!(network, count = ends.len(), "subnet is not a point-to-point wire");
                continue;
            }
            let (r2, i2, c2) = ends.pop().unwrap_or_default();
            let (r1, i1, c1) = ends.pop().unwrap_or_default();
            if r1 == r2 {
                continue;
            }
            self.add_link(&r1, &r2, c1)?;
            self.set_edge_interface(&r1, &r2, i1.clone())?;
            self.add_link(&r2, &r1, c2)?;
            self.set_edge_interface(&r2, &r1, i2.clone())?;
            self.set_next_hop(r1.clone(), i1, r2.clone());
            self.set_next_hop(r2, i2, r1);
        }

        self.derive_blocked_edges();
        Ok(())
    }

    /// Turn destination-only deny entries of interface ACLs into
    /// blocked-edge entries. Inbound lists block the edge towards the
    /// router, outbound lists the edge away from it.
    fn derive_blocked_edges(&mut self) {
        let mut found: Vec<(Ipv4Prefix, (String, String))> = Vec::new();
        for router in self.routers.values() {
            for interface in router.interfaces.values() {
                let groups = [
                    (interface.access_group_in.as_deref(), true),
                    (interface.access_group_out.as_deref(), false),
                ];
                for (acl_name, inbound) in groups {
                    let Some(acl_name) = acl_name else { continue };
                    let Some(acl) = router.access_lists.get(acl_name) else {
                        continue;
                    };
                    let Some(next_hop) = self.next_hop(&router.name, &interface.name) else {
                        continue;
                    };
                    for entry in acl.entries() {
                        if entry.action() == AclAction::Deny && entry.src_net().length() == 0 {
                            let edge = if inbound {
                                (next_hop.to_string(), router.name.clone())
                            } else {
                                (router.name.clone(), next_hop.to_string())
                            };
                            found.push((*entry.dst_net(), edge));
                        }
                    }
                }
            }
        }
        for (prefix, edge) in found {
            debug!(%prefix, ?edge, "interface ACL drops traffic on edge");
            self.add_blocked_edge(prefix, edge);
        }
    }

    /// Unordered router pairs connected by at least `k` edge-disjoint
    /// paths in the undirected graph.
    pub fn k_connected_router_pairs(&self, k: u64) -> BTreeSet<(String, String)> {
        let names: Vec<&str> = self.nodes().collect();
        let index: BTreeMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        let n = names.len();

        // unit-capacity arcs in both directions per undirected edge
        let mut base = vec![vec![0u64; n]; n];
        for (a, b) in self.undirected_edges() {
            if let (Some(&i), Some(&j)) = (index.get(a.as_str()), index.get(b.as_str())) {
                base[i][j] = 1;
                base[j][i] = 1;
            }
        }

        let mut pairs = BTreeSet::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if edge_disjoint_paths(&base, i, j, k) >= k {
                    let (a, b) = (names[i].to_string(), names[j].to_string());
                    if a <= b {
                        pairs.insert((a, b));
                    } else {
                        pairs.insert((b, a));
                    }
                }
            }
        }
        pairs
    }
}

/// Count edge-disjoint paths from `src` to `dst` by BFS augmentation on
/// unit capacities, stopping once `limit` paths are found.
fn edge_disjoint_paths(base: &[Vec<u64>], src: usize, dst: usize, limit: u64) -> u64 {
    let n = base.len();
    let mut residual: Vec<Vec<u64>> = base.to_vec();
    let mut flow = 0;

    while flow < limit {
        let mut parent = vec![usize::MAX; n];
        parent[src] = src;
        let mut queue = VecDeque::from([src]);
        while let Some(u) = queue.pop_front() {
            if u == dst {
                break;
            }
            for v in 0..n {
                if residual[u][v] > 0 && parent[v] == usize::MAX {
                    parent[v] = u;
                    queue.push_back(v);
                }
            }
        }
        if parent[dst] == usize::MAX {
            break;
        }
        let mut v = dst;
        while v != src {
            let u = parent[v];
            residual[u][v] -= 1;
            residual[v][u] += 1;
            v = u;
        }
        flow += 1;
    }
    flow
}
