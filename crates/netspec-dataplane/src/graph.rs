//! Name-indexed directed graphs over routers.
//!
//! Both forwarding graphs (router to next hop, per destination class)
//! and dominator graphs (router to its immediate dominator towards the
//! sink) use the same representation: a directed graph whose nodes are
//! router names, with a side index for name lookup.

use indexmap::IndexMap;
use petgraph::algo::{self, dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

/// A directed graph over named routers.
#[derive(Debug, Default, Clone)]
pub struct RouterGraph {
    graph: DiGraph<String, ()>,
    index: IndexMap<String, NodeIndex>,
}

impl RouterGraph {
    pub fn new() -> Self {
        RouterGraph::default()
    }

    pub fn from_edges<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut graph = RouterGraph::new();
        for (src, dst) in edges {
            graph.add_edge(src, dst);
        }
        graph
    }

    pub fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn add_edge(&mut self, src: &str, dst: &str) {
        let src = self.ensure_node(src);
        let dst = self.ensure_node(dst);
        if self.graph.find_edge(src, dst).is_none() {
            self.graph.add_edge(src, dst, ());
        }
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn has_edge(&self, src: &str, dst: &str) -> bool {
        match (self.index.get(src), self.index.get(dst)) {
            (Some(&src), Some(&dst)) => self.graph.find_edge(src, dst).is_some(),
            _ => false,
        }
    }

    pub fn remove_edge(&mut self, src: &str, dst: &str) -> bool {
        let (Some(&src), Some(&dst)) = (self.index.get(src), self.index.get(dst)) else {
            return false;
        };
        match self.graph.find_edge(src, dst) {
            Some(edge) => {
                self.graph.remove_edge(edge);
                true
            }
            None => false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.graph.edge_indices().filter_map(|edge| {
            let (src, dst) = self.graph.edge_endpoints(edge)?;
            Some((self.graph[src].as_str(), self.graph[dst].as_str()))
        })
    }

    pub fn out_neighbors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    pub fn in_neighbors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].as_str())
            .collect()
    }

    /// All simple paths from `src` to `dst`, as router-name sequences.
    pub fn simple_paths(&self, src: &str, dst: &str) -> Vec<Vec<String>> {
        let (Some(&src), Some(&dst)) = (self.index.get(src), self.index.get(dst)) else {
            return Vec::new();
        };
        algo::all_simple_paths::<Vec<NodeIndex>, _>(&self.graph, src, dst, 0, None)
            .map(|path| path.into_iter().map(|n| self.graph[n].clone()).collect())
            .collect()
    }

    /// The same graph with every edge flipped.
    pub fn reversed(&self) -> RouterGraph {
        let mut reversed = RouterGraph::new();
        for name in self.nodes() {
            reversed.ensure_node(name);
        }
        for (src, dst) in self.edges() {
            reversed.add_edge(dst, src);
        }
        reversed
    }

    /// `(node, immediate dominator)` pairs for every node reachable from
    /// `root`, the root itself excluded. `None` when the root is absent.
    pub fn immediate_dominators(&self, root: &str) -> Option<Vec<(String, String)>> {
        let &root_idx = self.index.get(root)?;
        let dominators = dominators::simple_fast(&self.graph, root_idx);

        let mut pairs = Vec::new();
        for (name, &idx) in &self.index {
            if idx == root_idx {
                continue;
            }
            if let Some(idom) = dominators.immediate_dominator(idx) {
                pairs.push((name.clone(), self.graph[idom].clone()));
            }
        }
        Some(pairs)
    }
}
