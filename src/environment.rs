//! Host environment classification from a user-agent string.
//!
//! Some chat apps open links in an embedded browser that blocks audio and
//! speech APIs.  [`BrowserEnvironment`] recognises that case and tells the
//! front-end which way out to offer; following the redirect is up to the
//! host.

/// Signature of the in-app browser that blocks speech playback.
const RESTRICTED_IN_APP_SIGNATURE: &str = "kakaotalk";

/// What the front-end should offer to escape a restricted in-app browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectAffordance {
    /// Full browser; nothing to offer.
    None,
    /// Android: open the page in Chrome through this intent URL.
    OpenInChrome(String),
    /// iOS and others: show the "open in another browser" instructions.
    ManualInstructions,
}

/// Steps shown when the app cannot switch browsers by itself.
pub const MANUAL_INSTRUCTIONS: &str = "\
아이폰에서는 보안 정책상 앱 강제 전환이 불가능합니다.
1. 우측 하단 점 3개(⋯) 메뉴 클릭
2. '다른 브라우저로 열기' 선택";

/// Pure classification of one user-agent string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserEnvironment {
    user_agent: String,
}

impl BrowserEnvironment {
    pub fn from_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Case-insensitive match on the in-app client signature.
    pub fn is_restricted_in_app_browser(&self) -> bool {
        self.user_agent
            .to_ascii_lowercase()
            .contains(RESTRICTED_IN_APP_SIGNATURE)
    }

    pub fn is_android(&self) -> bool {
        self.user_agent.to_ascii_lowercase().contains("android")
    }

    pub fn is_ios(&self) -> bool {
        let ua = self.user_agent.to_ascii_lowercase();
        ["iphone", "ipad", "ipod"].iter().any(|d| ua.contains(d))
    }

    /// Which escape hatch to present for the page at `page_url`.
    pub fn redirect_affordance(&self, page_url: &str) -> RedirectAffordance {
        if !self.is_restricted_in_app_browser() {
            RedirectAffordance::None
        } else if self.is_android() {
            RedirectAffordance::OpenInChrome(chrome_intent_url(page_url))
        } else {
            RedirectAffordance::ManualInstructions
        }
    }
}

/// Android intent URL that opens `page_url` in Chrome.
///
/// ```
/// use global_foreman::environment::chrome_intent_url;
///
/// assert_eq!(
///     chrome_intent_url("https://foreman.example/app?x=1"),
///     "intent://foreman.example/app?x=1#Intent;scheme=https;package=com.android.chrome;end"
/// );
/// ```
pub fn chrome_intent_url(page_url: &str) -> String {
    let lower = page_url.to_ascii_lowercase();
    let without_scheme = if lower.starts_with("https://") {
        &page_url[8..]
    } else if lower.starts_with("http://") {
        &page_url[7..]
    } else {
        page_url
    };
    format!("intent://{without_scheme}#Intent;scheme=https;package=com.android.chrome;end")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
