//! Popup Session
//!
//! What the popup does when it opens: read the cached dataset from storage
//! (never from the network), find the policy captured for the active tab's
//! domain, and use that policy as the initial search. The search box then
//! filters by domain only.

use crate::config::CacheConfig;
use crate::dataset::parse_dataset;
use crate::policy::StoredPolicy;
use crate::query::{search, search_domain_only};
use crate::storage::KeyValueStore;
use crate::types::{CapturedPolicy, DatasetRecord};
use crate::url::hostname;

/// Why the popup has no policy to show. The message is user-facing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("An error occurred while retrieving the active tab.")]
    NoActiveTab,
    #[error("No CSP found for this domain.")]
    NoPolicy(String),
    #[error("An error occurred while retrieving the CSP.")]
    Storage(String),
}

pub struct PopupSession {
    records: Vec<DatasetRecord>,
    active: Result<CapturedPolicy, LookupError>,
}

impl PopupSession {
    /// Open a session for the tab showing `active_url` (`None` when the
    /// browser reported no active tab).
    pub async fn open<S: KeyValueStore>(store: &S, config: &CacheConfig, active_url: Option<&str>) -> Self {
        let records = load_records(store, config).await;
        let active = match active_url {
            Some(url) => lookup_policy(store, url).await,
            None => Err(LookupError::NoActiveTab),
        };
        Self { records, active }
    }

    /// Build a session from already loaded parts.
    pub fn from_parts(records: Vec<DatasetRecord>, active: Result<CapturedPolicy, LookupError>) -> Self {
        Self { records, active }
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    pub fn active_policy(&self) -> Result<&CapturedPolicy, &LookupError> {
        self.active.as_ref()
    }

    /// Results seeded by the active tab's policy.
    pub fn seeded_results(&self) -> Vec<&DatasetRecord> {
        match &self.active {
            Ok(policy) => search(&policy.value, &self.records),
            Err(_) => Vec::new(),
        }
    }

    pub fn search(&self, query: &str) -> Vec<&DatasetRecord> {
        search(query, &self.records)
    }

    /// Live search box: domain column only.
    pub fn search_box(&self, query: &str) -> Vec<&DatasetRecord> {
        search_domain_only(query, &self.records)
    }
}

async fn load_records<S: KeyValueStore>(store: &S, config: &CacheConfig) -> Vec<DatasetRecord> {
    let key = config.payload_key.as_str();
    match store.get(&[key]).await {
        Ok(stored) => match stored.get(key).and_then(|v| v.as_str()) {
            Some(text) => parse_dataset(text),
            None => {
                log::error!("CSP data is not available.");
                Vec::new()
            }
        },
        Err(e) => {
            log::error!("Error retrieving CSP data: {}", e);
            Vec::new()
        }
    }
}

async fn lookup_policy<S: KeyValueStore>(store: &S, url: &str) -> Result<CapturedPolicy, LookupError> {
    let domain = hostname(url).unwrap_or_default();
    if domain.is_empty() {
        return Err(LookupError::NoPolicy(domain));
    }

    let mut stored = store.get(&[domain.as_str()]).await.map_err(|e| {
        log::error!("Error retrieving CSP for the domain: {}", e);
        LookupError::Storage(e.to_string())
    })?;

    match stored.remove(&domain) {
        Some(value) => StoredPolicy::from_value(&domain, value).map_err(|e| {
            log::error!("Stored CSP for {} is unreadable: {}", domain, e);
            LookupError::Storage(e.to_string())
        }),
        None => Err(LookupError::NoPolicy(domain)),
    }
}
