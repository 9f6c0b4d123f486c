//! # References
//!
//! A reference is a lazily evaluated target: it names *how* to find
//! endpoints, not which ones. Resolution happens on every dispatch, so an
//! endpoint registered after the reference was built is still found.

use crate::endpoint::{EndpointId, InternalEndpoint};
use crate::filter::Filter;
use crate::registry::EndpointRegistry;
use nmr_types::{NmrError, Properties};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::vec;

/// Target of an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    query: Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Query {
    Properties(Properties),
    Filter(Filter),
    Endpoint(EndpointId),
}

/// Serialized reference form accepted by
/// [`EndpointRegistry::lookup_document`]. Exactly one field must be set.
///
/// ```json
/// { "properties": { "NAME": "echo" } }
/// { "filter": "(&(NAME=echo)(version>=2))" }
/// { "endpoint": "67e55044-10b1-426f-9247-bb680e5fe0c8" }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReferenceDocument {
    properties: Option<Properties>,
    filter: Option<String>,
    endpoint: Option<EndpointId>,
}

impl Reference {
    /// Endpoints whose properties are a superset of `properties`.
    #[must_use]
    pub fn properties(properties: Properties) -> Self {
        Self {
            query: Query::Properties(properties),
        }
    }

    /// Endpoints matching an LDAP filter.
    #[must_use]
    pub fn filter(filter: Filter) -> Self {
        Self {
            query: Query::Filter(filter),
        }
    }

    /// One specific endpoint.
    #[must_use]
    pub fn endpoint(id: EndpointId) -> Self {
        Self {
            query: Query::Endpoint(id),
        }
    }

    /// Parses a JSON reference document.
    pub fn from_document(document: &str) -> Result<Self, NmrError> {
        let doc: ReferenceDocument = serde_json::from_str(document)
            .map_err(|e| NmrError::InvalidReference(e.to_string()))?;
        match doc {
            ReferenceDocument {
                properties: Some(properties),
                filter: None,
                endpoint: None,
            } => Ok(Self::properties(properties)),
            ReferenceDocument {
                properties: None,
                filter: Some(filter),
                endpoint: None,
            } => Ok(Self::filter(Filter::parse(&filter)?)),
            ReferenceDocument {
                properties: None,
                filter: None,
                endpoint: Some(id),
            } => Ok(Self::endpoint(id)),
            _ => Err(NmrError::InvalidReference(
                "exactly one of properties, filter or endpoint must be set".to_string(),
            )),
        }
    }

    /// Resolves the current candidates, in registration order.
    ///
    /// The returned sequence is a snapshot; call again to re-evaluate.
    #[must_use]
    pub fn choose(&self, registry: &EndpointRegistry) -> Candidates {
        let endpoints = match &self.query {
            Query::Properties(properties) => registry.query_internal(properties),
            Query::Filter(filter) => registry.query_filter_internal(filter),
            Query::Endpoint(id) => registry
                .get(*id)
                .filter(|endpoint| !endpoint.is_retired())
                .into_iter()
                .collect(),
        };
        Candidates {
            inner: endpoints.into_iter(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.query {
            Query::Properties(properties) => fmt::Display::fmt(properties, f),
            Query::Filter(filter) => fmt::Display::fmt(filter, f),
            Query::Endpoint(id) => write!(f, "endpoint:{id}"),
        }
    }
}

impl From<Properties> for Reference {
    fn from(properties: Properties) -> Self {
        Self::properties(properties)
    }
}

impl From<Filter> for Reference {
    fn from(filter: Filter) -> Self {
        Self::filter(filter)
    }
}

impl From<EndpointId> for Reference {
    fn from(id: EndpointId) -> Self {
        Self::endpoint(id)
    }
}

/// Candidate endpoints produced by [`Reference::choose`].
#[derive(Debug)]
pub struct Candidates {
    inner: vec::IntoIter<Arc<InternalEndpoint>>,
}

impl Iterator for Candidates {
    type Item = Arc<InternalEndpoint>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Candidates {}
