//! # Endpoint Properties
//!
//! String-keyed metadata describing an endpoint, and the superset match used
//! by registry queries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property map attached to endpoints and used as lookup queries.
///
/// Keys are unique; iteration order is the key order, which keeps
/// `Display` output stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    /// Endpoint name, the identifier used by the authorization gate.
    pub const NAME: &'static str = "NAME";
    /// Interface QName in `{ns}local` form.
    pub const INTERFACE_NAME: &'static str = "INTERFACE_NAME";
    /// Service QName in `{ns}local` form.
    pub const SERVICE_NAME: &'static str = "SERVICE_NAME";
    /// Endpoint name within the service.
    pub const ENDPOINT_NAME: &'static str = "ENDPOINT_NAME";
    /// `"true"` excludes the endpoint from reference resolution.
    pub const UNTARGETABLE: &'static str = "UNTARGETABLE";
    /// `"true"` delivers to this endpoint on the dispatching thread.
    pub const CHANNEL_SYNC_DELIVERY: &'static str = "channel.syncDelivery";

    /// Creates an empty property map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Reads a boolean flag; anything other than a case-insensitive `true`
    /// is false.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Superset match: every key of `query` is present here with an equal
    /// value. Extra keys on `self` are ignored; comparison is case-sensitive.
    #[must_use]
    pub fn matches(&self, query: &Properties) -> bool {
        query
            .0
            .iter()
            .all(|(key, value)| self.0.get(key) == Some(value))
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Properties {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}
