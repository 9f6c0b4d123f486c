//! # Security Principals
//!
//! Principals identify the groups an authenticated caller belongs to. The
//! router never authenticates anyone: a `Subject` is attached to the In
//! message by whoever did, and the authorization gate only compares sets.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A named principal group. `*` is the wildcard group [`Principal::ANY`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wildcard group name.
    pub const ANY: &'static str = "*";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The wildcard principal granting access to everyone.
    #[must_use]
    pub fn any() -> Self {
        Self(Self::ANY.to_string())
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        self.0 == Self::ANY
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Parses a comma separated ACL list such as `"admin, ops"`; blank
    /// items are dropped.
    #[must_use]
    pub fn parse_list(acls: &str) -> HashSet<Principal> {
        acls.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Principal::new)
            .collect()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The authenticated caller attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    principals: HashSet<Principal>,
}

impl Subject {
    pub fn new(principals: impl IntoIterator<Item = Principal>) -> Self {
        Self {
            principals: principals.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn principals(&self) -> &HashSet<Principal> {
        &self.principals
    }

    /// Whether any of this subject's principals is in `acls`.
    #[must_use]
    pub fn intersects(&self, acls: &HashSet<Principal>) -> bool {
        self.principals.iter().any(|p| acls.contains(p))
    }
}
