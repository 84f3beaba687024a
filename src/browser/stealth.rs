//! Anti-detection overrides
//!
//! Injects scripts that run before any page script executes, overriding the
//! automation-detectable navigator properties the target's fingerprinting
//! checks. This closes the most common detection vector; the launch flag
//! `--disable-blink-features=AutomationControlled` covers the rest.

use crate::error::{Error, Result};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use tracing::{debug, instrument};

/// Pre-navigation fingerprint overrides
pub struct StealthOverrides;

impl StealthOverrides {
    /// Apply all overrides to a page
    #[instrument(skip(page))]
    pub async fn apply(page: &Page) -> Result<()> {
        Self::hide_webdriver(page).await?;
        Self::mock_plugins(page).await?;
        Self::mock_languages(page).await?;
        debug!("stealth overrides applied");
        Ok(())
    }

    /// Hide the navigator.webdriver automation flag
    async fn hide_webdriver(page: &Page) -> Result<()> {
        let script = r#"
            Object.defineProperty(navigator, 'webdriver', {
                get: () => undefined,
                configurable: true
            });
        "#;
        Self::inject_script(page, script).await
    }

    /// Report a non-empty plugin list
    async fn mock_plugins(page: &Page) -> Result<()> {
        let script = r#"
            Object.defineProperty(navigator, 'plugins', {
                get: () => [1, 2, 3, 4, 5],
                configurable: true
            });
        "#;
        Self::inject_script(page, script).await
    }

    /// Report a plausible language list
    async fn mock_languages(page: &Page) -> Result<()> {
        let script = r#"
            Object.defineProperty(navigator, 'languages', {
                get: () => ['en-US', 'en'],
                configurable: true
            });
        "#;
        Self::inject_script(page, script).await
    }

    /// Inject a script to run on every new document
    async fn inject_script(page: &Page, script: &str) -> Result<()> {
        let params = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(script)
            .build()
            .map_err(|e| Error::cdp(format!("Failed to build script params: {}", e)))?;

        page.execute(params)
            .await
            .map_err(|e| Error::cdp(format!("Failed to inject script: {}", e)))?;

        Ok(())
    }
}
