//! Browser session lifecycle
//!
//! One browser process plus one page, exclusively owned by the orchestrator
//! for the duration of an attempt. A leaked session leaks an OS-level
//! process, so the session must be released on every exit path exactly
//! once; [`CloseGuard`] makes a second release visible instead of silent.

use crate::browser::intercept::{self, QuiescenceTracker, RequestClassifier, ResponseCapture};
use crate::browser::stealth::StealthOverrides;
use crate::config::SearchConfig;
use crate::error::{Error, Result, SessionError};
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// One-shot latch around the session release
#[derive(Debug, Default)]
pub struct CloseGuard {
    closed: AtomicBool,
}

impl CloseGuard {
    /// Arm the guard. Returns true the first time, false afterwards.
    pub fn arm(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Whether the guard has been armed
    pub fn is_armed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A launched browser process with one active page
pub struct BrowserSession {
    browser: Browser,
    handler: Option<JoinHandle<()>>,
    page: Page,
    capture: ResponseCapture,
    quiescence: QuiescenceTracker,
    guard: CloseGuard,
}

impl BrowserSession {
    /// Launch a browser, open the page, and wire up stealth overrides,
    /// request interception, and the quiescence feed. The page has not
    /// navigated anywhere yet.
    #[instrument(skip(config), fields(headless = config.headless))]
    pub async fn launch(config: &SearchConfig) -> Result<Self> {
        info!("launching browser session");

        let mut builder = CdpBrowserConfig::builder();

        builder = builder.viewport(chromiumoxide::handler::viewport::Viewport {
            width: config.width,
            height: config.height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        });

        if !config.headless {
            builder = builder.with_head();
        }

        if !config.sandbox {
            builder = builder.arg("--no-sandbox").arg("--disable-setuid-sandbox");
        }
        builder = builder.arg("--disable-blink-features=AutomationControlled");

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder
            .build()
            .map_err(|e| SessionError::ConfigError(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| SessionError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("browser handler event error");
                    break;
                }
            }
            debug!("browser handler finished");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::PageCreationFailed(e.to_string()))?;

        StealthOverrides::apply(&page).await?;

        let user_agent = config.pick_user_agent();
        let ua_params = SetUserAgentOverrideParams::builder()
            .user_agent(user_agent)
            .build()
            .map_err(Error::cdp)?;
        page.execute(ua_params).await?;
        debug!(%user_agent, "identity applied");

        let classifier =
            RequestClassifier::new(&config.target_url, &config.blocked_path_fragment);
        let capture = ResponseCapture::new();
        let quiescence = QuiescenceTracker::spawn();
        intercept::install(&page, classifier, capture.clone(), quiescence.clone()).await?;

        info!("browser session active");

        Ok(Self {
            browser,
            handler: Some(handler_task),
            page,
            capture,
            quiescence,
            guard: CloseGuard::default(),
        })
    }

    /// The session's page
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// The out-of-band response capture slot
    pub fn capture(&self) -> &ResponseCapture {
        &self.capture
    }

    /// The network quiescence tracker
    pub fn quiescence(&self) -> &QuiescenceTracker {
        &self.quiescence
    }

    /// Release the browser process. Errs with `AlreadyClosed` on a second
    /// call; every attempt path must reach this exactly once.
    #[instrument(skip(self))]
    pub async fn close(&mut self) -> Result<()> {
        if !self.guard.arm() {
            return Err(SessionError::AlreadyClosed.into());
        }

        info!("closing browser session");

        self.browser
            .close()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        if let Some(handler) = self.handler.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handler).await;
        }

        info!("browser session closed");
        Ok(())
    }

    /// Whether the session has been released
    pub fn is_closed(&self) -> bool {
        self.guard.is_armed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_guard_arms_once() {
        let guard = CloseGuard::default();
        assert!(!guard.is_armed());
        assert!(guard.arm());
        assert!(guard.is_armed());
        assert!(!guard.arm());
        assert!(!guard.arm());
    }

    #[test]
    fn test_close_guard_threaded() {
        let guard = std::sync::Arc::new(CloseGuard::default());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = std::sync::Arc::clone(&guard);
            handles.push(std::thread::spawn(move || guard.arm()));
        }
        let firsts: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(firsts, 1);
    }
}
