//! Symbolic and concrete failure environments.
//!
//! An [`Environment`] is the symbolic description of the space of network
//! states reachable by failing at most `k` links; a
//! [`ConcreteEnvironment`] pins every link to up or down. Concrete
//! environments compare equal by their link-state assignment alone, no
//! matter how they were constructed; sampler deduplication depends on
//! that.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use indexmap::IndexMap;

use crate::combinatorics::{map_item_to_index, nth_combination, num_items};
use crate::link::{Link, LinkState};
use crate::ModelError;

/// Symbolic topology state: the full link set plus a failure budget.
#[derive(Debug, Clone)]
pub struct Environment {
    links: IndexMap<String, Link>,
    /// Symbolic link names in lexicographic order. The combinatorial
    /// index is positional over this ordering, so it must be stable.
    symbolic: Vec<String>,
    k_failures: Option<u64>,
    env_count: u128,
}

impl Environment {
    /// Build an environment over `links` with an unbounded failure budget
    /// (every symbolic link may fail).
    pub fn new(links: impl IntoIterator<Item = Link>) -> Self {
        let mut env = Environment {
            links: links.into_iter().map(|l| (l.name.clone(), l)).collect(),
            symbolic: Vec::new(),
            k_failures: None,
            env_count: 0,
        };
        env.recompute();
        env
    }

    pub fn with_max_failures(links: impl IntoIterator<Item = Link>, k: u64) -> Self {
        let mut env = Environment::new(links);
        env.set_max_failures(k);
        env
    }

    /// The failure budget; defaults to the number of symbolic links.
    pub fn max_failures(&self) -> u64 {
        self.k_failures
            .unwrap_or(self.symbolic.len() as u64)
            .min(self.symbolic.len() as u64)
    }

    pub fn set_max_failures(&mut self, k: u64) {
        self.k_failures = Some(k);
        self.recompute();
    }

    /// Pin a link's state, removing it from (or returning it to) the
    /// symbolic set.
    pub fn set_link(&mut self, name: &str, state: LinkState) -> Result<(), ModelError> {
        let link = self
            .links
            .get_mut(name)
            .ok_or_else(|| ModelError::UnknownLink(name.to_string()))?;
        link.state = state;
        self.recompute();
        Ok(())
    }

    fn recompute(&mut self) {
        self.symbolic = self
            .links
            .values()
            .filter(|l| l.state == LinkState::Symbolic)
            .map(|l| l.name.clone())
            .collect();
        self.symbolic.sort();
        self.env_count = num_items(self.symbolic.len() as u64, self.max_failures());
    }

    /// Number of distinct concrete environments, i.e.
    /// `sum_{j=0}^{k} C(|symbolic|, j)`.
    pub fn env_count(&self) -> u128 {
        self.env_count
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn symbolic_links(&self) -> &[String] {
        &self.symbolic
    }

    /// Prefix-notation conjunction of all non-symbolic (pinned) link
    /// states, used as the environment constraint in oracle queries.
    pub fn polish_notation(&self) -> String {
        let mut sorted: Vec<&Link> = self.links.values().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        fold_polish(sorted.into_iter().filter_map(|l| l.polish_notation()))
    }

    /// Decode flat item index `item` into a concrete environment: the
    /// item's combination of positions in the sorted symbolic list goes
    /// down, every other symbolic link comes up, pinned links keep their
    /// state.
    pub fn concrete_env(&self, item: u128) -> Result<ConcreteEnvironment, ModelError> {
        if item >= self.env_count {
            return Err(ModelError::EnvironmentIndexOutOfRange {
                item,
                count: self.env_count,
            });
        }
        let n = self.symbolic.len() as u64;
        let (index, k) = map_item_to_index(item, n, self.max_failures());
        let failed_positions = nth_combination(index, n, k);

        let mut states = BTreeMap::new();
        for link in self.links.values() {
            if link.state != LinkState::Symbolic {
                states.insert(link.name.clone(), link.state);
            }
        }
        for (position, name) in self.symbolic.iter().enumerate() {
            let state = if failed_positions.contains(&(position as u64)) {
                LinkState::Down
            } else {
                LinkState::Up
            };
            states.insert(name.clone(), state);
        }
        Ok(ConcreteEnvironment { states })
    }
}

/// A fully pinned network state: every link is up or down.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcreteEnvironment {
    states: BTreeMap<String, LinkState>,
}

impl ConcreteEnvironment {
    /// Build from a full link universe and the subset of failed names.
    /// Names absent from `failed` come up.
    pub fn from_failed_links<'a>(
        link_names: impl IntoIterator<Item = &'a str>,
        failed: &BTreeSet<String>,
    ) -> Self {
        let states = link_names
            .into_iter()
            .map(|name| {
                let state = if failed.contains(name) {
                    LinkState::Down
                } else {
                    LinkState::Up
                };
                (name.to_string(), state)
            })
            .collect();
        ConcreteEnvironment { states }
    }

    pub fn state(&self, name: &str) -> Option<LinkState> {
        self.states.get(name).copied()
    }

    /// Names of failed links, in lexicographic order.
    pub fn down_links(&self) -> Vec<&str> {
        self.links_in_state(LinkState::Down)
    }

    pub fn up_links(&self) -> Vec<&str> {
        self.links_in_state(LinkState::Up)
    }

    fn links_in_state(&self, state: LinkState) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Prefix-notation conjunction pinning every link.
    pub fn polish_notation(&self) -> String {
        fold_polish(self.states.iter().map(|(name, state)| {
            let bit = if *state == LinkState::Down { 1 } else { 0 };
            format!("= ( {name} ) ( {bit} )")
        }))
    }
}

impl fmt::Display for ConcreteEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConcreteEnvironment(down: [{}])",
            self.down_links().join(", ")
        )
    }
}

fn fold_polish(terms: impl Iterator<Item = String>) -> String {
    let mut output = String::new();
    for term in terms {
        if output.is_empty() {
            output = format!("( {term} )");
        } else {
            output = format!("( AND {output} ( {term} ) )");
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinatorics::{choose, index_of_combination};

    fn three_link_env() -> Environment {
        Environment::new(vec![
            Link::new("l0", "r1", "r2"),
            Link::new("l1", "r2", "r3"),
            Link::new("l2", "r1", "r3"),
        ])
    }

    #[test]
    fn env_count_is_the_stratum_sum() {
        let mut env = three_link_env();
        assert_eq!(env.env_count(), 8); // full powerset of 3 links
        env.set_max_failures(1);
        assert_eq!(env.env_count(), 1 + 3);
        env.set_max_failures(2);
        assert_eq!(env.env_count(), 1 + 3 + 3);
    }

    #[test]
    fn pinning_a_link_shrinks_the_symbolic_set() {
        let mut env = three_link_env();
        env.set_link("r1=r2", LinkState::Up).unwrap();
        assert_eq!(env.symbolic_links(), &["r1=r3", "r2=r3"]);
        assert_eq!(env.env_count(), 4);
        assert!(env.set_link("r4=r5", LinkState::Up).is_err());
    }

    #[test]
    fn item_zero_is_all_up() {
        let env = three_link_env();
        let concrete = env.concrete_env(0).unwrap();
        assert!(concrete.down_links().is_empty());
        assert_eq!(concrete.up_links().len(), 3);
    }

    #[test]
    fn every_item_respects_the_budget_and_decodes_back() {
        let mut env = three_link_env();
        env.set_max_failures(2);
        let n = env.symbolic_links().len() as u64;

        for item in 0..env.env_count() {
            let concrete = env.concrete_env(item).unwrap();
            let down = concrete.down_links();
            assert!(down.len() as u64 <= 2, "item {item} failed too many links");

            // Re-encode the failed-position set and check it lands on `item`.
            let positions: Vec<u64> = down
                .iter()
                .map(|name| {
                    env.symbolic_links()
                        .iter()
                        .position(|s| s == name)
                        .unwrap() as u64
                })
                .collect();
            let stratum_offset: u128 =
                (0..positions.len() as u64).map(|j| choose(n, j)).sum();
            let decoded = stratum_offset + index_of_combination(positions);
            assert_eq!(decoded, item);
        }
    }

    #[test]
    fn out_of_range_item_is_rejected() {
        let env = three_link_env();
        let err = env.concrete_env(env.env_count()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::EnvironmentIndexOutOfRange { .. }
        ));
    }

    #[test]
    fn equality_ignores_construction_path() {
        let env = three_link_env();
        let via_index = env.concrete_env(1).unwrap();
        let failed: BTreeSet<String> = via_index
            .down_links()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let names: Vec<&str> = env.links().map(|l| l.name.as_str()).collect();
        let via_names = ConcreteEnvironment::from_failed_links(names, &failed);
        assert_eq!(via_index, via_names);
    }

    #[test]
    fn polish_notation_folds_conjunctions() {
        let env = Environment::new(vec![
            Link::new("l0", "a", "b"),
            Link::new("l1", "b", "c"),
        ]);
        let concrete = env.concrete_env(0).unwrap();
        assert_eq!(
            concrete.polish_notation(),
            "( AND ( = ( a=b ) ( 0 ) ) ( = ( b=c ) ( 0 ) ) )"
        );
    }
}
