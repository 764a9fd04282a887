//! Core type definitions for BypassMap
//!
//! These types are shared by the capture channels, the policy store and the
//! query engine, and are what the wasm bindings hand back to the extension.

use serde::{Deserialize, Serialize};

// =============================================================================
// Tabs
// =============================================================================

/// Browser tab identifier.
pub type TabId = i32;

/// Tab ID the browser reports for requests not tied to a tab
/// (background pages, prefetches, extension traffic).
pub const NO_TAB: TabId = -1;

/// Is this a user-visible tab?
#[inline]
pub fn is_user_tab(tab_id: TabId) -> bool {
    tab_id > NO_TAB
}

// =============================================================================
// Dataset
// =============================================================================

/// One row of the bypass dataset: a domain and a known technique for abusing
/// a policy that allowlists it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub domain: String,
    pub code: String,
}

impl DatasetRecord {
    pub fn new(domain: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            code: code.into(),
        }
    }
}

// =============================================================================
// Captured Policies
// =============================================================================

/// Observation channel that produced a captured policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    /// `Content-Security-Policy` response header
    Header,
    /// `<meta http-equiv="Content-Security-Policy">` in the document
    Meta,
}

impl CaptureSource {
    /// Badge shown for a capture from this source.
    pub fn badge(self) -> BadgeState {
        match self {
            Self::Header => BadgeState::Header,
            Self::Meta => BadgeState::Meta,
        }
    }
}

/// The policy most recently accepted for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedPolicy {
    /// Bare hostname of the originating URL
    pub domain: String,
    /// Raw policy text
    pub value: String,
    pub source: CaptureSource,
}

// =============================================================================
// Badge
// =============================================================================

/// Per-tab indicator mirroring the last capture source seen in that tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BadgeState {
    Header,
    Meta,
    #[default]
    Cleared,
}

impl BadgeState {
    pub fn text(self) -> &'static str {
        match self {
            Self::Header => "H",
            Self::Meta => "M",
            Self::Cleared => "",
        }
    }

    /// RGBA background colour, or `None` when the badge is cleared.
    pub fn color(self) -> Option<[u8; 4]> {
        match self {
            Self::Header => Some([0, 255, 0, 255]),
            Self::Meta => Some([255, 165, 0, 255]),
            Self::Cleared => None,
        }
    }
}

// =============================================================================
// Arbitration
// =============================================================================

/// How the policy store arbitrates between the two capture channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapturePrecedence {
    /// Whichever channel writes last wins
    #[default]
    LastWriteWins,
    /// Header captures always write; meta captures only fill an unset entry
    /// or replace an earlier meta capture
    HeaderAuthoritative,
}

/// Which entries a tab closure evicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TabCloseScope {
    /// Only domains captured in the closing tab and no other open tab
    #[default]
    Tab,
    /// Every stored domain
    All,
}

// =============================================================================
// Request Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const MAIN_FRAME = 1 << 6;   // main document
        const XMLHTTPREQUEST = 1 << 7;

        /// Document types (main_frame + sub_frame)
        const DOCUMENT = Self::MAIN_FRAME.bits() | Self::SUBDOCUMENT.bits();
    }
}

impl RequestType {
    /// Parse from browser request type string.
    pub fn from_browser(s: &str) -> Self {
        match s {
            "main_frame" | "document" => Self::MAIN_FRAME,
            "sub_frame" | "subdocument" => Self::SUBDOCUMENT,
            "stylesheet" => Self::STYLESHEET,
            "script" => Self::SCRIPT,
            "image" => Self::IMAGE,
            "xmlhttprequest" | "xhr" => Self::XMLHTTPREQUEST,
            _ => Self::OTHER,
        }
    }

    /// Can a document of this type carry a CSP meta tag?
    #[inline]
    pub fn is_document(self) -> bool {
        self.intersects(Self::DOCUMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_text_and_color() {
        assert_eq!(BadgeState::Header.text(), "H");
        assert_eq!(BadgeState::Meta.text(), "M");
        assert_eq!(BadgeState::Cleared.text(), "");
        assert_eq!(BadgeState::Header.color(), Some([0, 255, 0, 255]));
        assert_eq!(BadgeState::Meta.color(), Some([255, 165, 0, 255]));
        assert_eq!(BadgeState::Cleared.color(), None);
    }

    #[test]
    fn test_request_type_documents() {
        assert!(RequestType::from_browser("main_frame").is_document());
        assert!(RequestType::from_browser("sub_frame").is_document());
        assert!(!RequestType::from_browser("script").is_document());
        assert!(!RequestType::from_browser("beacon").is_document());
    }

    #[test]
    fn test_user_tab() {
        assert!(is_user_tab(0));
        assert!(is_user_tab(42));
        assert!(!is_user_tab(NO_TAB));
    }

    #[test]
    fn test_precedence_serde_names() {
        let p: CapturePrecedence = serde_json::from_str("\"header-authoritative\"").unwrap();
        assert_eq!(p, CapturePrecedence::HeaderAuthoritative);
        let s: TabCloseScope = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(s, TabCloseScope::All);
    }
}
