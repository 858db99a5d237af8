//! Simple extended access lists.
//!
//! Entries are evaluated in configuration order; the first entry whose
//! source and destination networks both contain the queried networks
//! decides. A list with no matching entry denies.

use std::fmt;

use crate::prefix::Ipv4Prefix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclAction {
    Permit,
    Deny,
}

impl fmt::Display for AclAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclAction::Permit => f.write_str("permit"),
            AclAction::Deny => f.write_str("deny"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    action: AclAction,
    src_net: Ipv4Prefix,
    dst_net: Ipv4Prefix,
}

impl AclEntry {
    pub fn action(&self) -> AclAction {
        self.action
    }

    pub fn src_net(&self) -> &Ipv4Prefix {
        &self.src_net
    }

    pub fn dst_net(&self) -> &Ipv4Prefix {
        &self.dst_net
    }

    /// The entry matches only if it fully covers both networks.
    fn apply(&self, src: &Ipv4Prefix, dst: &Ipv4Prefix) -> Option<AclAction> {
        if self.src_net.contains(src) && self.dst_net.contains(dst) {
            Some(self.action)
        } else {
            None
        }
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}->{}", self.action, self.src_net, self.dst_net)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessList {
    name: String,
    entries: Vec<AclEntry>,
}

impl AccessList {
    pub fn new(name: impl Into<String>) -> Self {
        AccessList {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    pub fn add_permit(&mut self, src_net: Ipv4Prefix, dst_net: Ipv4Prefix) {
        self.add_entry(AclAction::Permit, src_net, dst_net);
    }

    pub fn add_deny(&mut self, src_net: Ipv4Prefix, dst_net: Ipv4Prefix) {
        self.add_entry(AclAction::Deny, src_net, dst_net);
    }

    pub fn add_entry(&mut self, action: AclAction, src_net: Ipv4Prefix, dst_net: Ipv4Prefix) {
        self.entries.push(AclEntry {
            action,
            src_net,
            dst_net,
        });
    }

    /// Whether traffic from `src` to `dst` passes this list.
    pub fn pass_through(&self, src: &Ipv4Prefix, dst: &Ipv4Prefix) -> bool {
        for entry in &self.entries {
            match entry.apply(src, dst) {
                Some(AclAction::Permit) => return true,
                Some(AclAction::Deny) => return false,
                None => continue,
            }
        }
        // implicit deny at the end of every list
        false
    }
}

impl fmt::Display for AccessList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ACL {}", self.name)?;
        for entry in &self.entries {
            write!(f, "\n\t{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Prefix {
        s.parse().unwrap()
    }

    #[test]
    fn first_match_wins() {
        let mut acl = AccessList::new("block-lab");
        acl.add_deny(net("10.0.1.0/24"), net("10.0.2.0/24"));
        acl.add_permit(net("0.0.0.0/0"), net("0.0.0.0/0"));

        assert!(!acl.pass_through(&net("10.0.1.0/24"), &net("10.0.2.0/24")));
        assert!(!acl.pass_through(&net("10.0.1.64/26"), &net("10.0.2.0/24")));
        assert!(acl.pass_through(&net("10.0.3.0/24"), &net("10.0.2.0/24")));
    }

    #[test]
    fn empty_list_denies() {
        let acl = AccessList::new("empty");
        assert!(!acl.pass_through(&net("0.0.0.0/0"), &net("0.0.0.0/0")));
    }

    #[test]
    fn entry_needs_full_coverage_of_both_networks() {
        let mut acl = AccessList::new("partial");
        acl.add_permit(net("10.0.1.0/25"), net("10.0.2.0/24"));
        // queried source is wider than the entry's source network
        assert!(!acl.pass_through(&net("10.0.1.0/24"), &net("10.0.2.0/24")));
        assert!(acl.pass_through(&net("10.0.1.0/26"), &net("10.0.2.0/24")));
    }
}
