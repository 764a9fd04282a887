//! Background lifecycle
//!
//! Wires the dataset cache and the capture coordinator to one shared store.
//! On every (re)start the store is wiped before the dataset refresh is
//! attempted, so captures never outlive the background process.

use std::rc::Rc;

use crate::cache::{Clock, DatasetCache, DatasetSource};
use crate::capture::{
    BadgeIndicator, CaptureCoordinator, DocumentSource, NavigationCompletedEvent, ResponseHeadersEvent,
};
use crate::config::Config;
use crate::policy::CaptureOutcome;
use crate::popup::PopupSession;
use crate::storage::KeyValueStore;
use crate::types::TabId;

pub struct Background<S, D, F, B, C> {
    store: Rc<S>,
    cache: DatasetCache<Rc<S>, D, C>,
    capture: CaptureCoordinator<Rc<S>, F, B>,
    config: Config,
}

impl<S, D, F, B, C> Background<S, D, F, B, C>
where
    S: KeyValueStore,
    D: DatasetSource,
    F: DocumentSource,
    B: BadgeIndicator,
    C: Clock,
{
    pub fn new(store: S, source: D, documents: F, badge: B, clock: C, config: Config) -> Self {
        let store = Rc::new(store);
        let cache = DatasetCache::new(Rc::clone(&store), source, clock, config.cache.clone());
        let capture = CaptureCoordinator::new(Rc::clone(&store), documents, badge, config.capture);
        Self {
            store,
            cache,
            capture,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &DatasetCache<Rc<S>, D, C> {
        &self.cache
    }

    pub fn capture(&self) -> &CaptureCoordinator<Rc<S>, F, B> {
        &self.capture
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wipe storage, then make sure the dataset is present and fresh.
    pub async fn start(&self) -> Option<String> {
        match self.store.clear().await {
            Ok(()) => log::info!("Local storage cleared."),
            Err(e) => log::error!("Error clearing local storage: {}", e),
        }
        self.capture.reset();
        self.cache.ensure_fresh().await
    }

    pub async fn on_response_headers(&self, event: &ResponseHeadersEvent<'_>) -> Option<CaptureOutcome> {
        self.capture.on_response_headers(event).await
    }

    pub async fn on_navigation_completed(&self, event: &NavigationCompletedEvent<'_>) -> Option<CaptureOutcome> {
        self.capture.on_navigation_completed(event).await
    }

    pub async fn on_tab_removed(&self, tab_id: TabId) -> Vec<String> {
        self.capture.on_tab_removed(tab_id).await
    }

    pub async fn open_popup(&self, active_url: Option<&str>) -> PopupSession {
        PopupSession::open(self.store.as_ref(), &self.config.cache, active_url).await
    }
}
