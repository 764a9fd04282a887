//! Policy Store
//!
//! Domain-keyed store of captured policies. Each domain is either unset or
//! holds the one policy accepted last; which writes are accepted depends on
//! [`CapturePrecedence`]. A `tab -> domains` index lets a tab closure evict
//! only what that tab captured.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CaptureConfig;
use crate::error::Result;
use crate::types::{CapturePrecedence, CaptureSource, CapturedPolicy, TabCloseScope, TabId};

/// Shape of a captured policy in the key/value store, keyed by its domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPolicy {
    pub value: String,
    pub source: CaptureSource,
}

impl StoredPolicy {
    pub fn to_value(policy: &CapturedPolicy) -> Result<Value> {
        Ok(serde_json::to_value(StoredPolicy {
            value: policy.value.clone(),
            source: policy.source,
        })?)
    }

    pub fn from_value(domain: &str, value: Value) -> Result<CapturedPolicy> {
        let stored: StoredPolicy = serde_json::from_value(value)?;
        Ok(CapturedPolicy {
            domain: domain.to_string(),
            value: stored.value,
            source: stored.source,
        })
    }
}

/// Result of offering a capture to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The capture is now the domain's policy
    Stored { previous: Option<CapturedPolicy> },
    /// The precedence rule kept the existing policy
    Rejected { existing: CaptureSource },
}

impl CaptureOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

#[derive(Debug, Default)]
pub struct PolicyStore {
    precedence: CapturePrecedence,
    tab_close: TabCloseScope,
    policies: HashMap<String, CapturedPolicy>,
    tabs: HashMap<TabId, BTreeSet<String>>,
}

impl PolicyStore {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            precedence: config.precedence,
            tab_close: config.tab_close,
            policies: HashMap::new(),
            tabs: HashMap::new(),
        }
    }

    pub fn precedence(&self) -> CapturePrecedence {
        self.precedence
    }

    pub fn tab_close_scope(&self) -> TabCloseScope {
        self.tab_close
    }

    /// Offer a capture observed in `tab_id`.
    ///
    /// The tab is indexed against the domain even when the capture is
    /// rejected, since the tab still depends on the stored entry.
    pub fn record(&mut self, tab_id: TabId, policy: CapturedPolicy) -> CaptureOutcome {
        self.tabs.entry(tab_id).or_default().insert(policy.domain.clone());

        let existing = self.policies.get(&policy.domain);
        if let Some(existing) = existing {
            if !self.admits(existing.source, policy.source) {
                log::debug!(
                    "Kept {:?} policy for {}, ignoring {:?} capture",
                    existing.source,
                    policy.domain,
                    policy.source
                );
                return CaptureOutcome::Rejected {
                    existing: existing.source,
                };
            }
        }

        let previous = self.policies.insert(policy.domain.clone(), policy);
        CaptureOutcome::Stored { previous }
    }

    fn admits(&self, existing: CaptureSource, incoming: CaptureSource) -> bool {
        match self.precedence {
            CapturePrecedence::LastWriteWins => true,
            CapturePrecedence::HeaderAuthoritative => {
                incoming == CaptureSource::Header || existing == CaptureSource::Meta
            }
        }
    }

    pub fn get(&self, domain: &str) -> Option<&CapturedPolicy> {
        self.policies.get(domain)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Stored domains in sorted order.
    pub fn domains(&self) -> Vec<&str> {
        let mut domains: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        domains.sort_unstable();
        domains
    }

    /// Domains observed in a tab.
    pub fn tab_domains(&self, tab_id: TabId) -> impl Iterator<Item = &str> {
        self.tabs.get(&tab_id).into_iter().flatten().map(String::as_str)
    }

    /// Forget a closed tab and evict entries according to the configured scope.
    /// Returns the evicted domains, sorted.
    pub fn close_tab(&mut self, tab_id: TabId) -> Vec<String> {
        match self.tab_close {
            TabCloseScope::All => {
                self.tabs.clear();
                let mut evicted: Vec<String> = self.policies.drain().map(|(domain, _)| domain).collect();
                evicted.sort_unstable();
                evicted
            }
            TabCloseScope::Tab => {
                let Some(domains) = self.tabs.remove(&tab_id) else {
                    return Vec::new();
                };
                let mut evicted = Vec::new();
                for domain in domains {
                    let shared = self.tabs.values().any(|other| other.contains(&domain));
                    if !shared && self.policies.remove(&domain).is_some() {
                        evicted.push(domain);
                    }
                }
                evicted
            }
        }
    }

    pub fn clear(&mut self) {
        self.policies.clear();
        self.tabs.clear();
    }
}
