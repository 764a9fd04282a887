//! Capture Coordinator
//!
//! Feeds the policy store from two independent observation channels:
//!
//! - header channel: a completed response carries a `Content-Security-Policy`
//!   header
//! - meta channel: a completed document navigation is fetched again and its
//!   HTML contains `<meta http-equiv="Content-Security-Policy">`
//!
//! The channels are not ordered against each other. Which one wins for a
//! domain is decided by the store's [`CapturePrecedence`](crate::types::CapturePrecedence).

use std::cell::{Ref, RefCell};
use std::collections::HashMap;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::config::CaptureConfig;
use crate::error::Result;
use crate::policy::{CaptureOutcome, PolicyStore, StoredPolicy};
use crate::storage::KeyValueStore;
use crate::types::{is_user_tab, BadgeState, CaptureSource, CapturedPolicy, RequestType, TabId};
use crate::url::hostname;

pub const CSP_HEADER: &str = "content-security-policy";

// =============================================================================
// Capabilities
// =============================================================================

/// Fetches a document's HTML for meta-tag scanning.
#[async_trait(?Send)]
pub trait DocumentSource {
    async fn fetch_document(&self, url: &str) -> Result<String>;
}

/// The browser action badge.
pub trait BadgeIndicator {
    fn set_badge_text(&self, tab_id: TabId, text: &str);

    fn set_badge_background_color(&self, tab_id: TabId, color: [u8; 4]);

    fn show(&self, tab_id: TabId, badge: BadgeState) {
        self.set_badge_text(tab_id, badge.text());
        if let Some(color) = badge.color() {
            self.set_badge_background_color(tab_id, color);
        }
    }
}

// =============================================================================
// Events
// =============================================================================

pub struct ResponseHeader<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

/// Response headers became available for a request.
pub struct ResponseHeadersEvent<'a> {
    pub tab_id: TabId,
    pub url: &'a str,
    pub headers: &'a [ResponseHeader<'a>],
}

/// A request finished loading.
pub struct NavigationCompletedEvent<'a> {
    pub tab_id: TabId,
    pub url: &'a str,
    pub request_type: RequestType,
}

// =============================================================================
// Extraction
// =============================================================================

/// Value of the first `Content-Security-Policy` header (name compared
/// case-insensitively).
pub fn find_csp_header<'a>(headers: &[ResponseHeader<'a>]) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(CSP_HEADER))
        .map(|h| h.value)
}

/// Content of the first `<meta http-equiv="Content-Security-Policy">` tag,
/// if that tag has non-empty content.
pub fn extract_meta_csp(html: &str) -> Option<String> {
    let selector = Selector::parse("meta[http-equiv]").ok()?;
    let document = Html::parse_document(html);

    let meta = document.select(&selector).find(|element| {
        element
            .value()
            .attr("http-equiv")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(CSP_HEADER))
    })?;

    meta.value()
        .attr("content")
        .filter(|content| !content.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct CaptureCoordinator<S, F, B> {
    store: S,
    documents: F,
    badge: B,
    policies: RefCell<PolicyStore>,
}

impl<S, F, B> CaptureCoordinator<S, F, B>
where
    S: KeyValueStore,
    F: DocumentSource,
    B: BadgeIndicator,
{
    pub fn new(store: S, documents: F, badge: B, config: CaptureConfig) -> Self {
        Self {
            store,
            documents,
            badge,
            policies: RefCell::new(PolicyStore::new(config)),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn documents(&self) -> &F {
        &self.documents
    }

    pub fn badge(&self) -> &B {
        &self.badge
    }

    pub fn policies(&self) -> Ref<'_, PolicyStore> {
        self.policies.borrow()
    }

    pub fn policy(&self, domain: &str) -> Option<CapturedPolicy> {
        self.policies.borrow().get(domain).cloned()
    }

    /// Header channel. Returns `None` when the event carries nothing to capture.
    pub async fn on_response_headers(&self, event: &ResponseHeadersEvent<'_>) -> Option<CaptureOutcome> {
        let value = find_csp_header(event.headers)?;
        if !is_user_tab(event.tab_id) {
            log::debug!("Ignoring CSP header outside a tab: {}", event.url);
            return None;
        }
        let domain = capture_domain(event.url)?;

        Some(
            self.accept(
                event.tab_id,
                CapturedPolicy {
                    domain,
                    value: value.to_string(),
                    source: CaptureSource::Header,
                },
            )
            .await,
        )
    }

    /// Meta channel. Re-fetches the document; fetch failures are logged.
    pub async fn on_navigation_completed(&self, event: &NavigationCompletedEvent<'_>) -> Option<CaptureOutcome> {
        if !event.request_type.is_document() || !is_user_tab(event.tab_id) {
            return None;
        }

        let html = match self.documents.fetch_document(event.url).await {
            Ok(html) => html,
            Err(e) => {
                log::error!("Failed to fetch the HTML for CSP meta tag ({}): {}", event.url, e);
                return None;
            }
        };

        let value = extract_meta_csp(&html)?;
        let domain = capture_domain(event.url)?;

        Some(
            self.accept(
                event.tab_id,
                CapturedPolicy {
                    domain,
                    value,
                    source: CaptureSource::Meta,
                },
            )
            .await,
        )
    }

    /// Evict the closed tab's entries and clear its badge.
    /// Returns the evicted domains.
    pub async fn on_tab_removed(&self, tab_id: TabId) -> Vec<String> {
        let evicted = self.policies.borrow_mut().close_tab(tab_id);

        for domain in &evicted {
            if let Err(e) = self.store.remove(domain).await {
                log::error!("Error removing stored CSP for {}: {}", domain, e);
            }
        }

        self.badge.show(tab_id, BadgeState::Cleared);
        log::debug!("Tab {} closed, evicted {} domain(s)", tab_id, evicted.len());
        evicted
    }

    /// Drop every in-memory entry (storage is handled by the caller).
    pub fn reset(&self) {
        self.policies.borrow_mut().clear();
    }

    async fn accept(&self, tab_id: TabId, policy: CapturedPolicy) -> CaptureOutcome {
        let outcome = self.policies.borrow_mut().record(tab_id, policy.clone());
        if !outcome.is_stored() {
            return outcome;
        }

        if let Err(e) = self.persist(&policy).await {
            log::error!("Error storing CSP for {}: {}", policy.domain, e);
        }

        self.badge.show(tab_id, policy.source.badge());
        log::info!("Captured {:?} CSP for {} in tab {}", policy.source, policy.domain, tab_id);
        outcome
    }

    async fn persist(&self, policy: &CapturedPolicy) -> Result<()> {
        let value = StoredPolicy::to_value(policy)?;
        self.store
            .set(HashMap::from([(policy.domain.clone(), value)]))
            .await
    }
}

fn capture_domain(url: &str) -> Option<String> {
    let domain = hostname(url);
    if domain.is_none() {
        log::debug!("No hostname in {}, skipping capture", url);
    }
    domain
}
