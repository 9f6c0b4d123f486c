//! Qualified names (`{namespace}local`), used for operations, services and
//! interfaces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A namespace-qualified name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    /// Namespace URI, empty when unqualified.
    pub namespace: String,
    /// Local part.
    pub local: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// An unqualified name.
    pub fn local(local: impl Into<String>) -> Self {
        Self::new("", local)
    }

    /// Parses `{ns}local` or a bare `local`. Never fails: a malformed
    /// `{` prefix is kept in the local part.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        if let Some(rest) = text.strip_prefix('{') {
            if let Some(end) = rest.find('}') {
                return Self::new(&rest[..end], &rest[end + 1..]);
            }
        }
        Self::local(text)
    }
}

impl FromStr for QName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}
