//! Forwarding equivalence class partitioning.
//!
//! All rule prefixes seen in a FIB dump are inserted into a binary trie
//! over destination address bits. A walk over the trie then splits the
//! whole IPv4 space into contiguous address ranges that are matched by
//! the same set of rules, so per-destination analysis only needs one
//! representative per range.

use netspec_model::prefix::Ipv4Prefix;
use tracing::error;

use crate::DataplaneError;

#[derive(Debug, Default)]
struct TrieNode {
    /// Child per next address bit.
    children: [Option<Box<TrieNode>>; 2],
    /// Address bits on the path to this node, high-aligned.
    bits: u32,
    len: u8,
    is_rule: bool,
}

impl TrieNode {
    fn is_leaf(&self) -> bool {
        self.children[0].is_none() && self.children[1].is_none()
    }
}

/// Binary trie over rule prefixes.
#[derive(Debug, Default)]
pub struct PrefixTrie {
    root: TrieNode,
}

enum WalkItem<'a> {
    Node {
        node: &'a TrieNode,
        class: u64,
        active: bool,
    },
    /// An uncovered sibling subtree below an active rule.
    Gap { bits: u32, len: u8, class: u64 },
}

impl PrefixTrie {
    pub fn new() -> Self {
        PrefixTrie::default()
    }

    pub fn insert(&mut self, prefix: &Ipv4Prefix) {
        let network = prefix.network();
        let mut node = &mut self.root;
        for depth in 0..prefix.length() {
            let bit = ((network >> (31 - depth)) & 1) as usize;
            node = node.children[bit].get_or_insert_with(|| {
                Box::new(TrieNode {
                    bits: high_bits(network, depth + 1),
                    len: depth + 1,
                    ..TrieNode::default()
                })
            });
        }
        node.is_rule = true;
    }

    /// All rule prefixes currently in the trie.
    pub fn prefixes(&self) -> Vec<Ipv4Prefix> {
        let mut rules = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            if node.is_rule {
                if let Ok(prefix) = Ipv4Prefix::new(node.bits, node.len) {
                    rules.push(prefix);
                }
            }
            for child in node.children.iter().flatten() {
                stack.push(child);
            }
        }
        rules
    }

    /// Partition the full address space into equivalence classes.
    ///
    /// A depth-first walk carries the innermost enclosing rule's class id.
    /// Leaves close one class; gaps (absent siblings under an active
    /// rule) are merged into the class of the rule covering them, with
    /// adjacent gaps of the same class collapsing into one range.
    pub fn partition(&self) -> Result<Vec<EquivalenceClass>, DataplaneError> {
        let mut classes: Vec<EquivalenceClass> = Vec::new();
        let mut current_class = 0u64;
        let mut last_class = 0u64;

        let mut stack = vec![WalkItem::Node {
            node: &self.root,
            class: 0,
            active: false,
        }];

        while let Some(item) = stack.pop() {
            match item {
                WalkItem::Node {
                    node,
                    mut class,
                    mut active,
                } => {
                    if !node.is_rule && node.is_leaf() {
                        error!("trie node without rule or children");
                        continue;
                    }

                    if node.is_rule {
                        last_class += 1;
                        class = last_class;
                        active = true;
                    }

                    if node.is_leaf() {
                        current_class = class;
                        let mut class = EquivalenceClass::new();
                        class.add_range(range_of(node.bits, node.len))?;
                        classes.push(class);
                        continue;
                    }

                    // the stack pops the one-subtree first, so gaps of a
                    // class arrive in descending, mutually abutting order
                    for bit in [0usize, 1] {
                        if let Some(child) = &node.children[bit] {
                            stack.push(WalkItem::Node {
                                node: child,
                                class,
                                active,
                            });
                        } else if active {
                            stack.push(WalkItem::Gap {
                                bits: node.bits | (bit as u32) << (31 - node.len),
                                len: node.len + 1,
                                class,
                            });
                        }
                    }
                }
                WalkItem::Gap { bits, len, class } => {
                    if classes.is_empty() || class != current_class {
                        current_class = class;
                        classes.push(EquivalenceClass::new());
                    }
                    if let Some(open) = classes.last_mut() {
                        open.add_range(range_of(bits, len))?;
                    }
                }
            }
        }

        Ok(classes)
    }
}

/// The top `len` bits of `value`, rest zeroed.
fn high_bits(value: u32, len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        value & (u32::MAX << (32 - u32::from(len)))
    }
}

/// First and last address covered by a prefix of the given bits/length.
fn range_of(bits: u32, len: u8) -> (u32, u32) {
    let host_mask = if len == 0 {
        u32::MAX
    } else {
        u32::MAX >> u32::from(len)
    };
    (bits, bits | host_mask)
}

/// A contiguous range of addresses that the dataplane treats uniformly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EquivalenceClass {
    range: Option<(u32, u32)>,
}

impl EquivalenceClass {
    pub fn new() -> Self {
        EquivalenceClass::default()
    }

    pub fn from_range(first: u32, last: u32) -> Self {
        EquivalenceClass {
            range: Some((first, last)),
        }
    }

    pub fn first(&self) -> Option<u32> {
        self.range.map(|(first, _)| first)
    }

    pub fn last(&self) -> Option<u32> {
        self.range.map(|(_, last)| last)
    }

    pub fn add_prefix(&mut self, prefix: &Ipv4Prefix) -> Result<(), DataplaneError> {
        self.add_range((prefix.network(), prefix.broadcast()))
    }

    /// Extend the class by a range. The range must overlap or abut the
    /// existing one.
    pub fn add_range(&mut self, (first, last): (u32, u32)) -> Result<(), DataplaneError> {
        let Some((class_first, class_last)) = self.range else {
            self.range = Some((first, last));
            return Ok(());
        };

        let before = i64::from(first) < i64::from(class_first)
            && i64::from(last) < i64::from(class_first) - 1;
        let after = i64::from(first) > i64::from(class_last) + 1
            && i64::from(last) > i64::from(class_last);
        if before || after {
            return Err(DataplaneError::DisjointRange {
                first,
                last,
                class_first,
                class_last,
            });
        }

        self.range = Some((class_first.min(first), class_last.max(last)));
        Ok(())
    }

    /// The `item`-th address of the range, falling back to the first
    /// address when the offset runs past the end.
    pub fn address(&self, item: u32) -> Option<u32> {
        let (first, last) = self.range?;
        if u64::from(first) + u64::from(item) <= u64::from(last) {
            Some(first + item)
        } else {
            Some(first)
        }
    }

    /// The single prefix spanning this class when it is aligned, or the
    /// longest aligned prefix starting at its first address otherwise.
    pub fn covering_prefix(&self) -> Option<Ipv4Prefix> {
        let (first, last) = self.range?;

        let mut i = 0u8;
        let mut curr = u64::from(first);
        while curr < u64::from(last) && u64::from(first) & (1u64 << i) == 0 {
            i += 1;
            curr |= 1u64 << i;
        }

        Ipv4Prefix::new(first, 32 - i).ok()
    }

    /// Decompose the range into the minimal list of aligned prefixes.
    pub fn prefixes(&self) -> Vec<Ipv4Prefix> {
        let Some((first, last)) = self.range else {
            return Vec::new();
        };

        let mut prefixes = Vec::new();
        let mut curr = u64::from(first);
        while curr <= u64::from(last) {
            let start = curr;
            let mut i = 0u8;
            while curr < u64::from(last) && start & (1u64 << i) == 0 {
                curr |= 1u64 << i;
                i += 1;
            }
            if let Ok(prefix) = Ipv4Prefix::new(start as u32, 32 - i) {
                prefixes.push(prefix);
            }
            curr += 1;
        }
        prefixes
    }
}

impl std::fmt::Display for EquivalenceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.range {
            Some((first, last)) => write!(
                f,
                "EquivalenceClass({} - {})",
                std::net::Ipv4Addr::from(first),
                std::net::Ipv4Addr::from(last)
            ),
            None => f.write_str("EquivalenceClass(empty)"),
        }
    }
}
