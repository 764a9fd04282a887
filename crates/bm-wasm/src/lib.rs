//! WebAssembly bindings for BypassMap
//!
//! The extension's background page owns the browser APIs (webRequest,
//! storage, badge); it hands raw headers, HTML and URLs to these functions and
//! applies what comes back. The popup loads the cached dataset and searches
//! through the same module.

use std::cell::RefCell;
use std::time::Duration;

use wasm_bindgen::prelude::*;
use bm_core::{
    cache::within_ttl,
    capture::{self, ResponseHeader},
    config::{CaptureConfig, DEFAULT_TTL_SECS},
    normalize,
    policy::{CaptureOutcome, PolicyStore, StoredPolicy},
    query::{self, Query},
    types::{is_user_tab, CapturePrecedence, CaptureSource, CapturedPolicy, DatasetRecord, TabCloseScope},
    url::hostname,
    parse_dataset_with_stats,
};

struct State {
    records: Vec<DatasetRecord>,
    policies: PolicyStore,
}

thread_local! {
    static STATE: RefCell<State> = RefCell::new(State {
        records: Vec::new(),
        policies: PolicyStore::new(CaptureConfig::default()),
    });
}

/// Set capture arbitration. Resets captured policies.
#[wasm_bindgen]
pub fn configure(precedence: &str, tab_close: &str) -> Result<(), JsValue> {
    let precedence = match precedence {
        "last-write-wins" => CapturePrecedence::LastWriteWins,
        "header-authoritative" => CapturePrecedence::HeaderAuthoritative,
        other => return Err(JsValue::from_str(&format!("Unknown precedence: {}", other))),
    };
    let tab_close = match tab_close {
        "tab" => TabCloseScope::Tab,
        "all" => TabCloseScope::All,
        other => return Err(JsValue::from_str(&format!("Unknown tab close scope: {}", other))),
    };

    STATE.with(|state| {
        state.borrow_mut().policies = PolicyStore::new(CaptureConfig { precedence, tab_close });
    });
    Ok(())
}

// =============================================================================
// Dataset
// =============================================================================

/// Parse the cached TSV payload and keep it for searching.
#[wasm_bindgen]
pub fn load_dataset(raw_text: &str) -> JsValue {
    let (records, stats) = parse_dataset_with_stats(raw_text);
    if records.is_empty() {
        web_sys::console::warn_1(&JsValue::from_str("CSP data is not available."));
    }

    STATE.with(|state| state.borrow_mut().records = records);

    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"lines".into(), &JsValue::from(stats.lines as u32));
    let _ = js_sys::Reflect::set(&result, &"records".into(), &JsValue::from(stats.records as u32));
    let _ = js_sys::Reflect::set(&result, &"dropped".into(), &JsValue::from(stats.dropped as u32));
    result.into()
}

#[wasm_bindgen]
pub fn dataset_size() -> u32 {
    STATE.with(|state| state.borrow().records.len() as u32)
}

/// Is the cached payload still inside the freshness window?
#[wasm_bindgen]
pub fn is_cache_fresh(has_payload: bool, fetched_at: f64, now: f64, ttl_secs: Option<f64>) -> bool {
    if !has_payload || !fetched_at.is_finite() {
        return false;
    }
    let ttl = Duration::from_secs(ttl_secs.map_or(DEFAULT_TTL_SECS, |s| s.max(0.0) as u64));
    within_ttl(fetched_at.max(0.0) as u64, now.max(0.0) as u64, ttl)
}

// =============================================================================
// Search
// =============================================================================

#[wasm_bindgen]
pub fn search(query: &str) -> JsValue {
    STATE.with(|state| records_to_js(&query::search(query, &state.borrow().records)))
}

#[wasm_bindgen]
pub fn search_domain_only(query: &str) -> JsValue {
    STATE.with(|state| records_to_js(&query::search_domain_only(query, &state.borrow().records)))
}

/// How a query will be interpreted: `{mode: "plain"|"directive", directive?, tokens?}`,
/// or `null` for an empty query.
#[wasm_bindgen]
pub fn describe_query(query: &str) -> JsValue {
    let Some(parsed) = Query::parse(query) else {
        return JsValue::NULL;
    };

    let result = js_sys::Object::new();
    match parsed {
        Query::Plain(text) => {
            let _ = js_sys::Reflect::set(&result, &"mode".into(), &"plain".into());
            let _ = js_sys::Reflect::set(&result, &"text".into(), &JsValue::from_str(&text));
        }
        Query::Directive { directive, tokens } => {
            let _ = js_sys::Reflect::set(&result, &"mode".into(), &"directive".into());
            let _ = js_sys::Reflect::set(&result, &"directive".into(), &JsValue::from_str(directive));
            let _ = js_sys::Reflect::set(&result, &"tokens".into(), &strings_to_js(&tokens));
        }
    }
    result.into()
}

#[wasm_bindgen]
pub fn normalize_directive(value: &str) -> js_sys::Array {
    strings_to_js(&normalize::normalize_directive(value))
}

// =============================================================================
// Capture
// =============================================================================

#[wasm_bindgen]
pub fn extract_hostname(url: &str) -> Option<String> {
    hostname(url)
}

/// First `Content-Security-Policy` value from a webRequest header list.
#[wasm_bindgen]
pub fn find_csp_header(headers: JsValue) -> Option<String> {
    let headers_array = js_sys::Array::from(&headers);
    let mut header_storage: Vec<(String, String)> = Vec::with_capacity(headers_array.length() as usize);

    for entry in headers_array.iter() {
        let name = js_sys::Reflect::get(&entry, &"name".into())
            .ok()
            .and_then(|value| value.as_string())
            .unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let value = js_sys::Reflect::get(&entry, &"value".into())
            .ok()
            .and_then(|value| value.as_string())
            .unwrap_or_default();
        header_storage.push((name, value));
    }

    let header_views: Vec<ResponseHeader<'_>> = header_storage
        .iter()
        .map(|(name, value)| ResponseHeader { name, value })
        .collect();

    capture::find_csp_header(&header_views).map(str::to_string)
}

#[wasm_bindgen]
pub fn extract_meta_csp(html: &str) -> Option<String> {
    capture::extract_meta_csp(html)
}

/// Offer a capture to the policy store.
///
/// Returns `null` when nothing should be recorded (background request, no
/// hostname, empty value). Otherwise `{stored, domain, badgeText, badgeColor,
/// storageValue}`; when `stored` is true the caller persists `storageValue`
/// under `domain` and applies the badge.
#[wasm_bindgen]
pub fn record_capture(tab_id: i32, url: &str, value: &str, source: &str) -> Result<JsValue, JsValue> {
    let source = match source {
        "header" => CaptureSource::Header,
        "meta" => CaptureSource::Meta,
        other => return Err(JsValue::from_str(&format!("Unknown capture source: {}", other))),
    };

    if !is_user_tab(tab_id) || value.is_empty() {
        return Ok(JsValue::NULL);
    }
    let Some(domain) = hostname(url) else {
        return Ok(JsValue::NULL);
    };

    let policy = CapturedPolicy {
        domain: domain.clone(),
        value: value.to_string(),
        source,
    };
    let storage_value = StoredPolicy::to_value(&policy)
        .map_err(|e| JsValue::from_str(&format!("Failed to encode policy: {}", e)))?;
    let outcome = STATE.with(|state| state.borrow_mut().policies.record(tab_id, policy));

    let js_result = js_sys::Object::new();
    let stored = matches!(outcome, CaptureOutcome::Stored { .. });
    let _ = js_sys::Reflect::set(&js_result, &"stored".into(), &JsValue::from(stored));
    let _ = js_sys::Reflect::set(&js_result, &"domain".into(), &JsValue::from_str(&domain));

    if stored {
        let badge = source.badge();
        let _ = js_sys::Reflect::set(&js_result, &"badgeText".into(), &JsValue::from_str(badge.text()));
        if let Some(color) = badge.color() {
            let color_array = js_sys::Array::new();
            for channel in color {
                color_array.push(&JsValue::from(channel));
            }
            let _ = js_sys::Reflect::set(&js_result, &"badgeColor".into(), &color_array);
        }
        let _ = js_sys::Reflect::set(
            &js_result,
            &"storageValue".into(),
            &JsValue::from_str(&storage_value.to_string()),
        );
    }

    Ok(js_result.into())
}

/// Forget a closed tab. Returns the domains whose storage keys should be removed.
#[wasm_bindgen]
pub fn tab_removed(tab_id: i32) -> js_sys::Array {
    let evicted = STATE.with(|state| state.borrow_mut().policies.close_tab(tab_id));
    strings_to_js(&evicted)
}

/// Captured policy for a domain: `{domain, value, source}` or `null`.
#[wasm_bindgen]
pub fn policy_for(domain: &str) -> JsValue {
    STATE.with(|state| {
        let state = state.borrow();
        let Some(policy) = state.policies.get(domain) else {
            return JsValue::NULL;
        };
        let result = js_sys::Object::new();
        let source = match policy.source {
            CaptureSource::Header => "header",
            CaptureSource::Meta => "meta",
        };
        let _ = js_sys::Reflect::set(&result, &"domain".into(), &JsValue::from_str(&policy.domain));
        let _ = js_sys::Reflect::set(&result, &"value".into(), &JsValue::from_str(&policy.value));
        let _ = js_sys::Reflect::set(&result, &"source".into(), &JsValue::from_str(source));
        result.into()
    })
}

/// Drop every captured policy (background restart).
#[wasm_bindgen]
pub fn reset_policies() {
    STATE.with(|state| state.borrow_mut().policies.clear());
}

fn records_to_js(records: &[&DatasetRecord]) -> JsValue {
    let array = js_sys::Array::new_with_length(records.len() as u32);
    for (i, record) in records.iter().enumerate() {
        let item = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&item, &"domain".into(), &JsValue::from_str(&record.domain));
        let _ = js_sys::Reflect::set(&item, &"code".into(), &JsValue::from_str(&record.code));
        array.set(i as u32, item.into());
    }
    array.into()
}

fn strings_to_js(values: &[String]) -> js_sys::Array {
    let array = js_sys::Array::new();
    for value in values {
        array.push(&JsValue::from_str(value));
    }
    array
}
