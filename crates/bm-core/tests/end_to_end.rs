use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use bm_core::capture::{NavigationCompletedEvent, ResponseHeader, ResponseHeadersEvent};
use bm_core::{
    Background, BadgeIndicator, CaptureSource, Clock, Config, DatasetSource, DocumentSource, Error,
    KeyValueStore, LookupError, MemoryStore, RequestType, Result, TabCloseScope, TabId,
};

const DATASET: &str = "domain\tcode\n\
                       www.google.com\t<script src=\"https://www.google.com/complete/search?client=chrome&jsonp=alert(1);\"></script>\n\
                       ajax.googleapis.com\t<script src=\"https://ajax.googleapis.com/ajax/libs/angularjs/1.6.0/angular.min.js\"></script><div ng-app ng-csp>{{$eval.constructor('alert(1)')()}}</div>\n\
                       malformed line without tab\n\
                       cdn.jsdelivr.net\t<script src=\"https://cdn.jsdelivr.net/npm/csp-bypass@1.0.2/dist/sval-classic.js\"></script>\n";

const NOW: u64 = 1_700_000_000_000;
const HOUR: u64 = 3_600_000;

struct Source {
    calls: Cell<usize>,
    fail: bool,
}

#[async_trait(?Send)]
impl DatasetSource for Source {
    async fn fetch_dataset(&self) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            Err(Error::network("503 Service Unavailable"))
        } else {
            Ok(DATASET.to_string())
        }
    }
}

#[derive(Default)]
struct Pages(HashMap<String, String>);

#[async_trait(?Send)]
impl DocumentSource for Pages {
    async fn fetch_document(&self, url: &str) -> Result<String> {
        self.0.get(url).cloned().ok_or_else(|| Error::network("not found"))
    }
}

#[derive(Default)]
struct Badge(RefCell<HashMap<TabId, String>>);

impl BadgeIndicator for Badge {
    fn set_badge_text(&self, tab_id: TabId, text: &str) {
        self.0.borrow_mut().insert(tab_id, text.to_string());
    }

    fn set_badge_background_color(&self, _tab_id: TabId, _color: [u8; 4]) {}
}

struct Fixed(u64);

impl Clock for Fixed {
    fn now_millis(&self) -> u64 {
        self.0
    }
}

fn background(fail: bool, config: Config) -> Background<MemoryStore, Source, Pages, Badge, Fixed> {
    let mut pages = Pages::default();
    pages.0.insert(
        "https://news.example.org/".to_string(),
        r#"<html><head><meta http-equiv="Content-Security-Policy" content="default-src 'self' https://*.googleapis.com"></head></html>"#
            .to_string(),
    );
    Background::new(
        MemoryStore::new(),
        Source { calls: Cell::new(0), fail },
        pages,
        Badge::default(),
        Fixed(NOW),
        config,
    )
}

#[tokio::test]
async fn start_wipes_storage_then_fetches() {
    let bg = background(false, Config::default());
    bg.store()
        .set(HashMap::from([
            ("stale.example.com".to_string(), json!({"value": "x", "source": "header"})),
            ("cspData".to_string(), json!("old\tdata")),
            ("lastFetchTimestamp".to_string(), json!(NOW - HOUR)),
        ]))
        .await
        .unwrap();

    let text = bg.start().await;
    assert_eq!(text.as_deref(), Some(DATASET));
    assert_eq!(bg.cache().source().calls.get(), 1);
    assert!(!bg.store().contains_key("stale.example.com"));
    assert_eq!(bg.store().peek("lastFetchTimestamp"), Some(json!(NOW)));

    // Fresh now: a second call does not hit the network
    assert_eq!(bg.cache().ensure_fresh().await.as_deref(), Some(DATASET));
    assert_eq!(bg.cache().source().calls.get(), 1);
}

#[tokio::test]
async fn start_with_failing_source_yields_no_data() {
    let bg = background(true, Config::default());
    assert_eq!(bg.start().await, None);
    assert!(bg.store().is_empty());

    let popup = bg.open_popup(Some("https://example.com/")).await;
    assert!(popup.records().is_empty());
}

#[tokio::test]
async fn captured_header_policy_drives_popup_search() {
    let bg = background(false, Config::default());
    bg.start().await;

    let headers = [
        ResponseHeader { name: "Server", value: "gws" },
        ResponseHeader {
            name: "Content-Security-Policy",
            value: "object-src 'none'; script-src 'self' https://*.google.com; base-uri 'none'",
        },
    ];
    bg.on_response_headers(&ResponseHeadersEvent {
        tab_id: 4,
        url: "https://mail.example.com/inbox",
        headers: &headers,
    })
    .await;
    assert_eq!(bg.capture().badge().0.borrow().get(&4).map(String::as_str), Some("H"));

    let popup = bg.open_popup(Some("https://mail.example.com/settings")).await;
    assert_eq!(popup.records().len(), 3);
    assert_eq!(popup.active_policy().unwrap().source, CaptureSource::Header);

    let domains: Vec<&str> = popup.seeded_results().iter().map(|r| r.domain.as_str()).collect();
    assert_eq!(domains, vec!["www.google.com"]);
}

#[tokio::test]
async fn captured_meta_policy_and_tab_close() {
    let bg = background(false, Config::default());
    bg.start().await;

    let outcome = bg
        .on_navigation_completed(&NavigationCompletedEvent {
            tab_id: 9,
            url: "https://news.example.org/",
            request_type: RequestType::MAIN_FRAME,
        })
        .await;
    assert!(outcome.unwrap().is_stored());

    let popup = bg.open_popup(Some("https://news.example.org/")).await;
    let domains: Vec<&str> = popup.seeded_results().iter().map(|r| r.domain.as_str()).collect();
    assert_eq!(domains, vec!["ajax.googleapis.com"]);

    assert_eq!(bg.on_tab_removed(9).await, vec!["news.example.org".to_string()]);
    assert_eq!(bg.capture().badge().0.borrow().get(&9).map(String::as_str), Some(""));

    let popup = bg.open_popup(Some("https://news.example.org/")).await;
    assert!(matches!(popup.active_policy(), Err(LookupError::NoPolicy(_))));
    // The dataset survives tab closure
    assert_eq!(popup.records().len(), 3);
}

#[tokio::test]
async fn closing_any_tab_clears_everything_in_all_scope() {
    let mut config = Config::default();
    config.capture.tab_close = TabCloseScope::All;
    let bg = background(false, config);
    bg.start().await;

    let headers = [ResponseHeader { name: "content-security-policy", value: "default-src 'self'" }];
    for (tab_id, url) in [(1, "https://a.com/"), (2, "https://b.com/")] {
        bg.on_response_headers(&ResponseHeadersEvent { tab_id, url, headers: &headers }).await;
    }

    bg.on_tab_removed(1).await;
    assert!(bg.capture().policies().is_empty());
    assert!(!bg.store().contains_key("a.com"));
    assert!(!bg.store().contains_key("b.com"));
    assert!(bg.store().contains_key("cspData"));
}
