//! Page navigation and bounded waits
//!
//! All waits carry an absolute timeout; the target network surface is
//! uncontrolled and can stall indefinitely. A failed navigation is
//! downgraded to a fallback outcome when the out-of-band capture slot
//! already holds the initial response body.

use crate::browser::intercept::ResponseCapture;
use crate::error::{Error, NavigationError, PageError, Result};
use chromiumoxide::Page;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Condition to wait for after navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Wait until the load event fires
    Load,
    /// Wait until DOMContentLoaded fires
    #[default]
    DomContentLoaded,
    /// Wait for load plus a short network settle
    NetworkIdle,
}

/// How a navigation concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The page loaded and the DOM is live
    Completed,
    /// Navigation failed but the raw initial response was captured;
    /// the captured body stands in for the rendered document
    FallbackCapture,
}

/// Page navigator
pub struct Navigator;

impl Navigator {
    /// Navigate to a URL under the given wait policy and timeout.
    ///
    /// On navigation failure, a filled capture slot turns the error into
    /// [`NavigationOutcome::FallbackCapture`] instead of re-raising.
    #[instrument(skip(page, capture))]
    pub async fn goto(
        page: &Page,
        capture: &ResponseCapture,
        url: &str,
        policy: WaitPolicy,
        timeout_ms: u64,
    ) -> Result<NavigationOutcome> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(NavigationError::InvalidUrl(url.to_string()).into());
        }

        info!("navigating to {url}");

        match Self::navigate_once(page, url, policy, timeout_ms).await {
            Ok(()) => {
                debug!("navigation complete");
                Ok(NavigationOutcome::Completed)
            }
            Err(e) if capture.is_filled() => {
                warn!("navigation failed ({e}), falling back to captured response");
                Ok(NavigationOutcome::FallbackCapture)
            }
            Err(e) => Err(e),
        }
    }

    async fn navigate_once(
        page: &Page,
        url: &str,
        policy: WaitPolicy,
        timeout_ms: u64,
    ) -> Result<()> {
        let timeout = Duration::from_millis(timeout_ms);

        tokio::time::timeout(timeout, page.goto(url))
            .await
            .map_err(|_| NavigationError::Timeout(timeout_ms))?
            .map_err(|e| NavigationError::LoadFailed(e.to_string()))?;

        Self::wait_for_ready(page, policy, timeout_ms).await
    }

    /// Wait for the document to satisfy the wait policy
    async fn wait_for_ready(page: &Page, policy: WaitPolicy, timeout_ms: u64) -> Result<()> {
        let script = match policy {
            WaitPolicy::Load => {
                r#"
                    new Promise(resolve => {
                        if (document.readyState === 'complete') {
                            resolve(true);
                        } else {
                            window.addEventListener('load', () => resolve(true));
                        }
                    })
                "#
            }
            WaitPolicy::DomContentLoaded => {
                r#"
                    new Promise(resolve => {
                        if (document.readyState !== 'loading') {
                            resolve(true);
                        } else {
                            document.addEventListener('DOMContentLoaded', () => resolve(true));
                        }
                    })
                "#
            }
            WaitPolicy::NetworkIdle => {
                r#"
                    new Promise(resolve => {
                        if (document.readyState === 'complete') {
                            setTimeout(() => resolve(true), 500);
                        } else {
                            window.addEventListener('load', () => {
                                setTimeout(() => resolve(true), 500);
                            });
                        }
                    })
                "#
            }
        };

        let timeout = Duration::from_millis(timeout_ms);
        tokio::time::timeout(timeout, page.evaluate(script))
            .await
            .map_err(|_| NavigationError::Timeout(timeout_ms))?
            .map_err(|e| Error::cdp(e.to_string()))?;

        Ok(())
    }

    /// Wait for an element to become visible: present in the DOM with a
    /// non-empty bounding box. Fails with `ElementNotFound` at the bound.
    #[instrument(skip(page))]
    pub async fn wait_for_visible(page: &Page, selector: &str, timeout_ms: u64) -> Result<()> {
        let script = format!(
            r#"
                new Promise((resolve, reject) => {{
                    const timeout = {};
                    const start = Date.now();

                    function check() {{
                        const el = document.querySelector('{}');
                        if (el) {{
                            const rect = el.getBoundingClientRect();
                            const style = window.getComputedStyle(el);
                            if (rect.width > 0 && rect.height > 0 &&
                                style.visibility !== 'hidden' && style.display !== 'none') {{
                                resolve(true);
                                return;
                            }}
                        }}
                        if (Date.now() - start > timeout) {{
                            reject(new Error('Timeout waiting for selector'));
                        }} else {{
                            requestAnimationFrame(check);
                        }}
                    }}
                    check();
                }})
            "#,
            timeout_ms,
            escape_selector(selector)
        );

        let timeout = Duration::from_millis(timeout_ms + 1000);
        tokio::time::timeout(timeout, page.evaluate(script.as_str()))
            .await
            .map_err(|_| PageError::ElementNotFound {
                selector: selector.to_string(),
                timeout_ms,
            })?
            .map_err(|_| PageError::ElementNotFound {
                selector: selector.to_string(),
                timeout_ms,
            })?;

        Ok(())
    }

    /// Whether a selector is present in the live DOM
    pub async fn marker_present(page: &Page, selector: &str) -> Result<bool> {
        let script = format!(
            "!!document.querySelector('{}')",
            escape_selector(selector)
        );
        let present: bool = page
            .evaluate(script.as_str())
            .await
            .map_err(|e| Error::cdp(e.to_string()))?
            .into_value()
            .map_err(|e| Error::cdp(e.to_string()))?;
        Ok(present)
    }

    /// Read the current value of an input field
    pub async fn read_input_value(page: &Page, selector: &str) -> Result<String> {
        let script = format!(
            r#"
            (() => {{
                const el = document.querySelector('{}');
                return el ? el.value : '';
            }})()
            "#,
            escape_selector(selector)
        );
        let value: String = page
            .evaluate(script.as_str())
            .await
            .map_err(|e| Error::cdp(e.to_string()))?
            .into_value()
            .map_err(|e| Error::cdp(e.to_string()))?;
        Ok(value)
    }

    /// The page's current URL, when the driver can report one
    pub async fn current_url(page: &Page) -> Option<String> {
        page.url().await.ok().flatten()
    }
}

/// Escape a selector for embedding in a single-quoted JS string
pub(crate) fn escape_selector(selector: &str) -> String {
    selector.replace('\\', "\\\\").replace('\'', "\\'")
}
