//! Search configuration
//!
//! Explicit configuration for a search attempt: browser launch options,
//! the external page contract (URL and DOM markers), and every timeout the
//! attempt is bounded by. All fields have documented defaults; the defaults
//! target the MCA company/LLP name-search page.

use crate::error::{NavigationError, Result};
use std::path::PathBuf;

/// Default target search page
pub const DEFAULT_TARGET_URL: &str =
    "https://www.mca.gov.in/content/mca/global/en/mca/fo-llp-services/company-llp-name-search.html";

/// Substring identifying the navigation sub-resource that must be aborted,
/// because it redirects away from the target page.
pub const DEFAULT_BLOCKED_PATH_FRAGMENT: &str = "/home";

/// User agent reported when the pool is empty
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

/// The fixed DOM-identifier contract of the external page.
///
/// Drift in any of these is an external failure mode, surfaced as a
/// `PageError`, not a defect in this crate.
#[derive(Debug, Clone)]
pub struct Selectors {
    /// The search term input
    pub search_input: String,
    /// The element that triggers the search
    pub search_trigger: String,
    /// The CAPTCHA modal container
    pub captcha_modal: String,
    /// The canvas the challenge is rendered on
    pub captcha_canvas: String,
    /// The CAPTCHA answer input
    pub captcha_input: String,
    /// The results table
    pub results_table: String,
    /// The inline error indicator shown instead of results
    pub inline_error: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            search_input: "#masterdata-search-box".to_string(),
            search_trigger: ".searchicon".to_string(),
            captcha_modal: "#captchaModal".to_string(),
            captcha_canvas: "#captchaCanvas".to_string(),
            captcha_input: "#customCaptchaInput".to_string(),
            results_table: "#masterdata-search-result table".to_string(),
            inline_error: "#masterdata-search-error".to_string(),
        }
    }
}

impl Selectors {
    /// The markers whose presence is verified before any interaction
    pub fn integrity_markers(&self) -> [&str; 3] {
        [&self.search_input, &self.search_trigger, &self.captcha_modal]
    }
}

/// Configuration for one search attempt
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Run the browser headless (default: true)
    pub headless: bool,
    /// Enable the Chrome sandbox (default: false; the original launch
    /// profile disables it)
    pub sandbox: bool,
    /// Browser window width (default: 1920)
    pub width: u32,
    /// Browser window height (default: 1080)
    pub height: u32,
    /// Path to Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<String>,
    /// User agents to pick from; empty pool falls back to
    /// [`DEFAULT_USER_AGENT`]
    pub user_agent_pool: Vec<String>,
    /// The search page URL
    pub target_url: String,
    /// Requests whose URL contains this substring are aborted
    pub blocked_path_fragment: String,
    /// DOM identifier contract of the target page
    pub selectors: Selectors,
    /// Navigation timeout in milliseconds (default: 30000)
    pub navigation_timeout_ms: u64,
    /// Bound on waiting for the CAPTCHA modal (default: 15000)
    pub captcha_timeout_ms: u64,
    /// Bound on waiting for results or an error indicator (default: 20000)
    pub result_timeout_ms: u64,
    /// Overall deadline for the whole attempt (default: 120000)
    pub attempt_timeout_ms: u64,
    /// Per-character delay when typing the CAPTCHA answer (default: 120)
    pub type_delay_ms: u64,
    /// Where to write failure screenshots and intermediate CAPTCHA bitmaps
    /// (None = no diagnostics files)
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: false,
            width: 1920,
            height: 1080,
            chrome_path: None,
            user_agent_pool: Vec::new(),
            target_url: DEFAULT_TARGET_URL.to_string(),
            blocked_path_fragment: DEFAULT_BLOCKED_PATH_FRAGMENT.to_string(),
            selectors: Selectors::default(),
            navigation_timeout_ms: 30000,
            captcha_timeout_ms: 15000,
            result_timeout_ms: 20000,
            attempt_timeout_ms: 120000,
            type_delay_ms: 120,
            diagnostics_dir: None,
        }
    }
}

impl SearchConfig {
    /// Create a new config builder
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::default()
    }

    /// Validate the target URL
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.target_url)
            .map_err(|e| NavigationError::InvalidUrl(format!("{}: {}", self.target_url, e)))?;
        if !self.target_url.starts_with("http://") && !self.target_url.starts_with("https://") {
            return Err(NavigationError::InvalidUrl(format!(
                "target must be http(s): {}",
                self.target_url
            ))
            .into());
        }
        Ok(())
    }

    /// Pick a user agent from the pool, or the pinned default
    pub fn pick_user_agent(&self) -> &str {
        if self.user_agent_pool.is_empty() {
            DEFAULT_USER_AGENT
        } else {
            let idx = rand::random_range(0..self.user_agent_pool.len());
            &self.user_agent_pool[idx]
        }
    }
}

/// Builder for SearchConfig
#[derive(Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    /// Enable/disable the Chrome sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.config.sandbox = sandbox;
        self
    }

    /// Set viewport dimensions
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    /// Set Chrome path
    pub fn chrome_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Add a user agent to the pool
    pub fn user_agent<S: Into<String>>(mut self, ua: S) -> Self {
        self.config.user_agent_pool.push(ua.into());
        self
    }

    /// Set the target search page URL
    pub fn target_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.target_url = url.into();
        self
    }

    /// Set the blocked path fragment
    pub fn blocked_path_fragment<S: Into<String>>(mut self, fragment: S) -> Self {
        self.config.blocked_path_fragment = fragment.into();
        self
    }

    /// Override the DOM identifier contract
    pub fn selectors(mut self, selectors: Selectors) -> Self {
        self.config.selectors = selectors;
        self
    }

    /// Set navigation timeout
    pub fn navigation_timeout_ms(mut self, ms: u64) -> Self {
        self.config.navigation_timeout_ms = ms;
        self
    }

    /// Set the CAPTCHA modal wait bound
    pub fn captcha_timeout_ms(mut self, ms: u64) -> Self {
        self.config.captcha_timeout_ms = ms;
        self
    }

    /// Set the result wait bound
    pub fn result_timeout_ms(mut self, ms: u64) -> Self {
        self.config.result_timeout_ms = ms;
        self
    }

    /// Set the overall attempt deadline
    pub fn attempt_timeout_ms(mut self, ms: u64) -> Self {
        self.config.attempt_timeout_ms = ms;
        self
    }

    /// Set the per-character typing delay
    pub fn type_delay_ms(mut self, ms: u64) -> Self {
        self.config.type_delay_ms = ms;
        self
    }

    /// Set the diagnostics output directory
    pub fn diagnostics_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.diagnostics_dir = Some(dir.into());
        self
    }

    /// Build the config
    pub fn build(self) -> SearchConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SearchConfig::default();
        assert!(config.headless);
        assert!(!config.sandbox);
        assert_eq!(config.navigation_timeout_ms, 30000);
        assert_eq!(config.target_url, DEFAULT_TARGET_URL);
        assert!(config.user_agent_pool.is_empty());
        assert!(config.diagnostics_dir.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = SearchConfig::builder()
            .headless(false)
            .viewport(1280, 720)
            .user_agent("TestBot/1.0")
            .target_url("https://example.com/search")
            .captcha_timeout_ms(5000)
            .type_delay_ms(50)
            .diagnostics_dir("/tmp/diag")
            .build();

        assert!(!config.headless);
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 720);
        assert_eq!(config.user_agent_pool, vec!["TestBot/1.0"]);
        assert_eq!(config.target_url, "https://example.com/search");
        assert_eq!(config.captcha_timeout_ms, 5000);
        assert_eq!(config.type_delay_ms, 50);
        assert_eq!(config.diagnostics_dir, Some(PathBuf::from("/tmp/diag")));
    }

    #[test]
    fn test_validate_accepts_https() {
        assert!(SearchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_http() {
        let config = SearchConfig::builder().target_url("ftp://example.com").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_garbage() {
        let config = SearchConfig::builder().target_url("not a url").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pick_user_agent_empty_pool_falls_back() {
        let config = SearchConfig::default();
        assert_eq!(config.pick_user_agent(), DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_pick_user_agent_from_pool() {
        let config = SearchConfig::builder()
            .user_agent("A/1.0")
            .user_agent("B/2.0")
            .build();
        let picked = config.pick_user_agent();
        assert!(picked == "A/1.0" || picked == "B/2.0");
    }

    #[test]
    fn test_integrity_markers() {
        let selectors = Selectors::default();
        let markers = selectors.integrity_markers();
        assert_eq!(markers[0], "#masterdata-search-box");
        assert_eq!(markers[1], ".searchicon");
        assert_eq!(markers[2], "#captchaModal");
    }
}
