//! Per-router forwarding tables with longest-prefix-match lookup.

use std::collections::BTreeMap;
use std::fmt;

use netspec_model::prefix::Ipv4Prefix;

/// One parsed FIB entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibEntry {
    pub prefix: Ipv4Prefix,
    pub interface: String,
    pub route_type: String,
    pub next_hop: String,
}

impl fmt::Display for FibEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.prefix, self.interface, self.route_type)
    }
}

/// A single router's forwarding table.
///
/// Entries are stored per exact rule prefix; lookups resolve to the
/// longest rule prefix containing the queried one, which may carry
/// several entries for multipath routes.
#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    routes: BTreeMap<Ipv4Prefix, Vec<FibEntry>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        RoutingTable::default()
    }

    pub fn add_entry(
        &mut self,
        prefix: Ipv4Prefix,
        interface: impl Into<String>,
        route_type: impl Into<String>,
        next_hop: impl Into<String>,
    ) {
        self.routes.entry(prefix).or_default().push(FibEntry {
            prefix,
            interface: interface.into(),
            route_type: route_type.into(),
            next_hop: next_hop.into(),
        });
    }

    /// Entries of the longest rule prefix containing `prefix`.
    pub fn entries(&self, prefix: &Ipv4Prefix) -> &[FibEntry] {
        self.routes
            .iter()
            .filter(|(rule, _)| rule.contains(prefix))
            .max_by_key(|(rule, _)| rule.length())
            .map(|(_, entries)| entries.as_slice())
            .unwrap_or(&[])
    }

    /// Next hops of the longest matching rule, one per multipath entry.
    pub fn next_hops(&self, prefix: &Ipv4Prefix) -> Vec<&str> {
        self.entries(prefix)
            .iter()
            .map(|entry| entry.next_hop.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Prefix {
        s.parse().unwrap()
    }

    #[test]
    fn lookup_picks_the_longest_matching_rule() {
        let mut table = RoutingTable::new();
        table.add_entry(net("0.0.0.0/0"), "eth0", "OspfRoute", "r2");
        table.add_entry(net("10.0.0.0/8"), "eth1", "OspfRoute", "r3");
        table.add_entry(net("10.12.0.0/16"), "eth2", "OspfRoute", "r4");

        assert_eq!(table.next_hops(&net("10.12.5.0/24")), vec!["r4"]);
        assert_eq!(table.next_hops(&net("10.13.0.0/16")), vec!["r3"]);
        assert_eq!(table.next_hops(&net("192.168.0.0/24")), vec!["r2"]);
    }

    #[test]
    fn multipath_rules_return_every_next_hop() {
        let mut table = RoutingTable::new();
        table.add_entry(net("10.0.0.0/8"), "eth0", "OspfRoute", "r2");
        table.add_entry(net("10.0.0.0/8"), "eth1", "OspfRoute", "r3");

        let mut hops = table.next_hops(&net("10.1.0.0/16"));
        hops.sort_unstable();
        assert_eq!(hops, vec!["r2", "r3"]);
    }

    #[test]
    fn wider_queries_than_any_rule_do_not_match() {
        let mut table = RoutingTable::new();
        table.add_entry(net("10.0.0.0/8"), "eth0", "OspfRoute", "r2");
        assert!(table.next_hops(&net("0.0.0.0/0")).is_empty());
        assert!(table.next_hops(&net("11.0.0.0/8")).is_empty());
    }
}
