//! Static query rewrites.
//!
//! A [`Wire`] redirects lookups: a registry query whose property map is
//! exactly a wire's `from` map is answered as if `to` had been asked.

use nmr_types::Properties;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A from-query / to-query pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    pub from: Properties,
    pub to: Properties,
}

impl Wire {
    #[must_use]
    pub fn new(from: Properties, to: Properties) -> Self {
        Self { from, to }
    }
}

/// Registered wires, first registered wins on duplicate `from` maps.
#[derive(Debug, Default)]
pub struct WireRegistry {
    wires: RwLock<Vec<Wire>>,
}

impl WireRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, wire: Wire) {
        debug!(from = %wire.from, to = %wire.to, "Wire registered");
        self.wires.write().push(wire);
    }

    /// Removes the first wire equal to `wire`.
    pub fn unregister(&self, wire: &Wire) -> bool {
        let mut wires = self.wires.write();
        match wires.iter().position(|w| w == wire) {
            Some(index) => {
                wires.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn wires(&self) -> Vec<Wire> {
        self.wires.read().clone()
    }

    /// The query to run for `query`, after wire rewriting.
    #[must_use]
    pub fn resolve(&self, query: &Properties) -> Properties {
        self.wires
            .read()
            .iter()
            .find(|wire| &wire.from == query)
            .map(|wire| wire.to.clone())
            .unwrap_or_else(|| query.clone())
    }
}
