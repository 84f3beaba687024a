//! Failure diagnostics
//!
//! Best-effort side channel: full-page screenshots on fatal transitions and
//! optional dumps of the intermediate CAPTCHA bitmaps. Never required for
//! correctness; every operation here degrades to "nothing saved" without
//! affecting the attempt's outcome.

use crate::browser::Navigator;
use crate::error::{Error, Result};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Context attached to a propagated failure
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    /// The page URL at failure time
    pub url: Option<String>,
    /// Path of the saved full-page screenshot, if any
    pub screenshot: Option<PathBuf>,
    /// Raw OCR output, where the failure involved recognition
    pub recognized_text: Option<String>,
}

/// Run a diagnostics capture under a hard bound. A wedged driver must not
/// delay session release, so expiry yields empty diagnostics instead of
/// waiting out the driver's own timeouts.
pub async fn bounded_capture<F>(bound: Duration, capture: F) -> Diagnostics
where
    F: Future<Output = Diagnostics>,
{
    match tokio::time::timeout(bound, capture).await {
        Ok(diagnostics) => diagnostics,
        Err(_) => {
            warn!(bound_ms = bound.as_millis() as u64, "diagnostics capture hit its bound");
            Diagnostics::default()
        }
    }
}

/// Writes diagnostic artifacts under a configured directory
pub struct DiagnosticsSink {
    dir: Option<PathBuf>,
}

impl DiagnosticsSink {
    /// A sink writing under `dir`; `None` disables file output
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Capture the current URL and a full-page screenshot
    pub async fn capture_failure(&self, page: &Page) -> Diagnostics {
        let url = Navigator::current_url(page).await;
        let screenshot = match &self.dir {
            Some(dir) => match Self::save_screenshot(page, dir).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("failed to save failure screenshot: {e}");
                    None
                }
            },
            None => None,
        };
        Diagnostics {
            url,
            screenshot,
            recognized_text: None,
        }
    }

    async fn save_screenshot(page: &Page, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
        let path = dir.join(format!("failure-{stamp}.png"));

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .from_surface(true)
            .capture_beyond_viewport(true)
            .build();
        let data = page
            .screenshot(params)
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        tokio::fs::write(&path, &data).await?;
        debug!(path = %path.display(), "failure screenshot saved");
        Ok(path)
    }

    /// Dump the raw and binarized challenge bitmaps
    pub async fn save_captcha_frames(&self, raw_png: &[u8], binarized_png: &[u8]) {
        let Some(dir) = &self.dir else { return };
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("failed to create diagnostics dir: {e}");
            return;
        }
        for (suffix, bytes) in [("raw", raw_png), ("binarized", binarized_png)] {
            let path = dir.join(format!("captcha-{stamp}-{suffix}.png"));
            if let Err(e) = tokio::fs::write(&path, bytes).await {
                warn!(path = %path.display(), "failed to save captcha frame: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_default_is_empty() {
        let diag = Diagnostics::default();
        assert!(diag.url.is_none());
        assert!(diag.screenshot.is_none());
        assert!(diag.recognized_text.is_none());
    }

    #[tokio::test]
    async fn test_bounded_capture_returns_result_when_prompt() {
        let diag = bounded_capture(Duration::from_secs(1), async {
            Diagnostics {
                url: Some("https://example.com".to_string()),
                screenshot: None,
                recognized_text: None,
            }
        })
        .await;
        assert_eq!(diag.url.as_deref(), Some("https://example.com"));
    }

    #[tokio::test]
    async fn test_bounded_capture_yields_empty_on_expiry() {
        let diag = bounded_capture(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Diagnostics {
                url: Some("https://example.com".to_string()),
                screenshot: None,
                recognized_text: None,
            }
        })
        .await;
        assert!(diag.url.is_none());
        assert!(diag.screenshot.is_none());
    }

    #[tokio::test]
    async fn test_save_captcha_frames_without_dir_is_noop() {
        let sink = DiagnosticsSink::new(None);
        sink.save_captcha_frames(b"raw", b"bin").await;
    }

    #[tokio::test]
    async fn test_save_captcha_frames_writes_both() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticsSink::new(Some(dir.path().to_path_buf()));
        sink.save_captcha_frames(b"raw-bytes", b"bin-bytes").await;

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.ends_with("-raw.png")));
        assert!(names.iter().any(|n| n.ends_with("-binarized.png")));
    }
}
