//! CAPTCHA challenge acquisition
//!
//! Waits for the challenge modal to become visible, then rasterizes the
//! canvas element clipped to its own bounding box. Capturing only the
//! element keeps surrounding UI out of the OCR input.

use crate::browser::Navigator;
use crate::config::Selectors;
use crate::error::{Error, PageError, Result};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::Page;
use tracing::{debug, instrument};

/// Locates and rasterizes the challenge region
pub struct CaptchaAcquirer;

impl CaptchaAcquirer {
    /// Wait for the CAPTCHA surface and capture its bitmap as PNG.
    ///
    /// Terminal for the attempt if the modal never appears within the
    /// bound.
    #[instrument(skip(page, selectors))]
    pub async fn acquire(page: &Page, selectors: &Selectors, timeout_ms: u64) -> Result<Vec<u8>> {
        Navigator::wait_for_visible(page, &selectors.captcha_modal, timeout_ms).await?;

        let canvas = page
            .find_element(selectors.captcha_canvas.as_str())
            .await
            .map_err(|_| PageError::ElementNotFound {
                selector: selectors.captcha_canvas.clone(),
                timeout_ms,
            })?;

        // Element screenshots are clipped to the element's box by the driver
        let png = canvas
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        debug!(bytes = png.len(), "captured challenge bitmap");
        Ok(png)
    }
}
