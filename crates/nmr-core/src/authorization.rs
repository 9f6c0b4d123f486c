//! # Authorization Gate
//!
//! Computes the principals allowed to invoke an endpoint operation by folding
//! an ordered list of [`AuthorizationEntry`] rules.
//!
//! ## Fold
//!
//! Entries are visited in ascending rank, registration order within a rank.
//! Entries whose endpoint or operation pattern does not match are skipped;
//! the rest apply to an accumulator that starts empty:
//!
//! | Type | Effect |
//! |------|--------|
//! | `Add` | union |
//! | `Set` | replace |
//! | `Remove` | difference |
//!
//! ## Patterns
//!
//! `*` matches everything. Anything else is a regular expression that must
//! match the whole name. Operation patterns are QNames whose namespace and
//! local part are matched independently; a rule without an operation, or a
//! lookup without one, matches any operation.
//!
//! Full-name matching has a visible consequence for the classic example
//! `Add * *`, `Remove ep.* *`, `Add ep1 role1`: `ep.*` also matches `ep3`,
//! so `ep3` folds to the empty set rather than `{*}`. Only names outside
//! `ep.*` keep `*`.
//!
//! Folded results are cached per (endpoint, operation) and the cache is
//! dropped on every registration change.

use nmr_types::{NmrError, Principal, QName, Subject};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// How an entry combines with the accumulated set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationType {
    Add,
    Set,
    Remove,
}

/// An authorization rule.
pub trait AuthorizationEntry: Send + Sync {
    fn entry_type(&self) -> AuthorizationType;

    fn rank(&self) -> i32;

    /// Endpoint name pattern.
    fn endpoint(&self) -> &str;

    /// Operation pattern; `None` applies to every operation.
    fn operation(&self) -> Option<&QName>;

    fn acls(&self) -> &HashSet<Principal>;
}

/// Plain data implementation of [`AuthorizationEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleAuthorizationEntry {
    pub entry_type: AuthorizationType,
    pub rank: i32,
    pub endpoint: String,
    pub operation: Option<QName>,
    pub acls: HashSet<Principal>,
}

impl SimpleAuthorizationEntry {
    /// Creates a rank 0 entry; `acls` is a comma separated principal list.
    pub fn new(
        entry_type: AuthorizationType,
        endpoint: impl Into<String>,
        operation: Option<QName>,
        acls: &str,
    ) -> Self {
        Self {
            entry_type,
            rank: 0,
            endpoint: endpoint.into(),
            operation,
            acls: Principal::parse_list(acls),
        }
    }

    #[must_use]
    pub fn with_rank(mut self, rank: i32) -> Self {
        self.rank = rank;
        self
    }
}

impl AuthorizationEntry for SimpleAuthorizationEntry {
    fn entry_type(&self) -> AuthorizationType {
        self.entry_type
    }

    fn rank(&self) -> i32 {
        self.rank
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn operation(&self) -> Option<&QName> {
        self.operation.as_ref()
    }

    fn acls(&self) -> &HashSet<Principal> {
        &self.acls
    }
}

// =============================================================================
// Pattern matching
// =============================================================================

#[derive(Debug)]
enum NamePattern {
    Any,
    Regex(Regex),
}

impl NamePattern {
    fn compile(pattern: &str) -> Result<Self, NmrError> {
        if pattern == "*" {
            return Ok(Self::Any);
        }
        Regex::new(&format!("^(?:{pattern})$"))
            .map(Self::Regex)
            .map_err(|e| NmrError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Regex(regex) => regex.is_match(name),
        }
    }
}

struct OperationPattern {
    namespace: NamePattern,
    local: NamePattern,
}

impl OperationPattern {
    fn compile(operation: &QName) -> Result<Self, NmrError> {
        // An empty namespace in a rule matches any namespace.
        let namespace = if operation.namespace.is_empty() {
            NamePattern::Any
        } else {
            NamePattern::compile(&operation.namespace)?
        };
        Ok(Self {
            namespace,
            local: NamePattern::compile(&operation.local)?,
        })
    }

    fn matches(&self, operation: &QName) -> bool {
        self.namespace.matches(&operation.namespace) && self.local.matches(&operation.local)
    }
}

struct CompiledEntry {
    entry: Arc<dyn AuthorizationEntry>,
    seq: u64,
    endpoint: NamePattern,
    operation: Option<OperationPattern>,
}

impl CompiledEntry {
    fn applies(&self, endpoint: &str, operation: Option<&QName>) -> bool {
        if !self.endpoint.matches(endpoint) {
            return false;
        }
        match (&self.operation, operation) {
            (Some(pattern), Some(operation)) => pattern.matches(operation),
            _ => true,
        }
    }
}

type CacheKey = (String, Option<QName>);

#[derive(Default)]
struct AuthorizationState {
    entries: Vec<CompiledEntry>,
    next_seq: u64,
    cache: HashMap<CacheKey, HashSet<Principal>>,
}

/// Registry of authorization entries with a folded-result cache.
#[derive(Default)]
pub struct AuthorizationRegistry {
    state: RwLock<AuthorizationState>,
}

impl AuthorizationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    ///
    /// # Errors
    ///
    /// [`NmrError::InvalidPattern`] if a pattern is not a valid regex.
    pub fn register(&self, entry: Arc<dyn AuthorizationEntry>) -> Result<(), NmrError> {
        let endpoint = NamePattern::compile(entry.endpoint())?;
        let operation = entry.operation().map(OperationPattern::compile).transpose()?;

        let mut state = self.state.write();
        let seq = state.next_seq;
        state.next_seq += 1;
        debug!(
            endpoint = entry.endpoint(),
            rank = entry.rank(),
            entry_type = ?entry.entry_type(),
            "Authorization entry registered"
        );
        state.entries.push(CompiledEntry {
            entry,
            seq,
            endpoint,
            operation,
        });
        state
            .entries
            .sort_by_key(|compiled| (compiled.entry.rank(), compiled.seq));
        state.cache.clear();
        Ok(())
    }

    /// Removes an entry previously registered.
    pub fn unregister(&self, entry: &Arc<dyn AuthorizationEntry>) -> bool {
        let mut state = self.state.write();
        let before = state.entries.len();
        state
            .entries
            .retain(|compiled| !std::ptr::addr_eq(Arc::as_ptr(&compiled.entry), Arc::as_ptr(entry)));
        let removed = state.entries.len() != before;
        if removed {
            state.cache.clear();
        }
        removed
    }

    /// Registered entries in fold order.
    #[must_use]
    pub fn entries(&self) -> Vec<Arc<dyn AuthorizationEntry>> {
        self.state
            .read()
            .entries
            .iter()
            .map(|compiled| Arc::clone(&compiled.entry))
            .collect()
    }

    /// The principals allowed on `endpoint` / `operation`.
    #[must_use]
    pub fn acls(&self, endpoint: &str, operation: Option<&QName>) -> HashSet<Principal> {
        let key = (endpoint.to_string(), operation.cloned());
        let state = self.state.upgradable_read();
        if let Some(hit) = state.cache.get(&key) {
            return hit.clone();
        }

        let mut acls = HashSet::new();
        for compiled in state
            .entries
            .iter()
            .filter(|compiled| compiled.applies(endpoint, operation))
        {
            match compiled.entry.entry_type() {
                AuthorizationType::Add => acls.extend(compiled.entry.acls().iter().cloned()),
                AuthorizationType::Set => acls = compiled.entry.acls().clone(),
                AuthorizationType::Remove => acls.retain(|p| !compiled.entry.acls().contains(p)),
            }
        }

        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        state.cache.insert(key, acls.clone());
        acls
    }

    /// Allow if the folded set contains [`Principal::ANY`] or shares a
    /// principal with `subject`.
    #[must_use]
    pub fn is_authorized(
        &self,
        endpoint: &str,
        operation: Option<&QName>,
        subject: Option<&Subject>,
    ) -> bool {
        let acls = self.acls(endpoint, operation);
        if acls.iter().any(Principal::is_any) {
            return true;
        }
        subject.is_some_and(|subject| subject.intersects(&acls))
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        self.state.read().cache.len()
    }
}
