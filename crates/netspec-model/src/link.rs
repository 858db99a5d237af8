//! Physical links with symbolic failure state.

use std::fmt;

use serde::Serialize;

/// State of a link within an environment.
///
/// `Symbolic` links are the ones the failure budget ranges over; a
/// concrete environment pins every symbolic link to `Up` or `Down`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LinkState {
    Symbolic,
    Up,
    Down,
}

/// An undirected link between two routers.
///
/// The name is canonical: endpoints joined in sorted order, so the same
/// physical link always maps to the same name no matter which direction
/// it was discovered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: String,
    pub name: String,
    pub endpoints: (String, String),
    pub state: LinkState,
}

impl Link {
    pub fn new(id: impl Into<String>, a: impl Into<String>, b: impl Into<String>) -> Self {
        Link::with_state(id, a, b, LinkState::Symbolic)
    }

    pub fn with_state(
        id: impl Into<String>,
        a: impl Into<String>,
        b: impl Into<String>,
        state: LinkState,
    ) -> Self {
        let (a, b) = (a.into(), b.into());
        let name = Link::canonical_name(&a, &b);
        Link {
            id: id.into(),
            name,
            endpoints: (a, b),
            state,
        }
    }

    /// Canonical (sorted-endpoint) link name.
    pub fn canonical_name(a: &str, b: &str) -> String {
        if a < b {
            format!("{a}={b}")
        } else {
            format!("{b}={a}")
        }
    }

    /// Render this link's pinned state as a prefix-notation equality,
    /// the form the oracle's environment formulas are built from.
    /// Only meaningful for concretized links.
    pub fn polish_notation(&self) -> Option<String> {
        let state = match self.state {
            LinkState::Up => 0,
            LinkState::Down => 1,
            LinkState::Symbolic => return None,
        };
        Some(format!("= ( {} ) ( {} )", self.name, state))
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {:?}", self.id, self.name, self.state)
    }
}
