//! Arithmetic CAPTCHA solving pipeline
//!
//! binarize → recognize → parse → compute. Binarization strips the anti-OCR
//! gradient noise while preserving glyph shape; recognition is restricted
//! to the digit/plus/space charset under a single-line assumption. Parsing
//! requires exactly two integer operands; anything else fails the attempt.
//! A wrong-but-plausible parse would silently corrupt the submission, so no
//! confidence correction is ever applied to misread glyphs.

use crate::captcha::CaptchaChallenge;
use crate::error::{CaptchaError, Result};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Pixels whose channel mean exceeds this become white; the rest black
pub const LUMINANCE_THRESHOLD: u16 = 128;

/// Charset the OCR engine is restricted to
pub const OCR_WHITELIST: &str = "0123456789+ ";

/// Binarize an RGBA bitmap: per-pixel mean of the color channels against a
/// fixed luminance threshold, alpha forced opaque. Idempotent.
pub fn binarize(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let mean = (r as u16 + g as u16 + b as u16) / 3;
        let value = if mean > LUMINANCE_THRESHOLD { 255 } else { 0 };
        *pixel = Rgba([value, value, value, 255]);
    }
    out
}

/// Decode a PNG, binarize it, and re-encode
pub fn binarize_png(png: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(png)
        .map_err(|e| CaptchaError::DecodeFailed(e.to_string()))?
        .to_rgba8();
    let binarized = binarize(&decoded);
    let mut buf = Cursor::new(Vec::new());
    binarized
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| CaptchaError::DecodeFailed(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Parse recognized text into exactly two integer operands.
///
/// Only whitespace is stripped before parsing. Any other stray glyph makes
/// its token unparseable and fails the challenge; dropping characters the
/// OCR engine should not have produced would amount to guessing.
pub fn parse_operands(recognized: &str) -> std::result::Result<(i64, i64), CaptchaError> {
    let cleaned: String = recognized.chars().filter(|c| !c.is_whitespace()).collect();

    let tokens: Vec<&str> = cleaned.split('+').collect();
    if tokens.len() != 2 {
        return Err(CaptchaError::SolveFailure {
            recognized: recognized.to_string(),
            reason: format!("expected exactly two operands, found {}", tokens.len()),
        });
    }

    let mut operands = [0i64; 2];
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CaptchaError::SolveFailure {
                recognized: recognized.to_string(),
                reason: format!("operand {:?} is not an integer", token),
            });
        }
        operands[i] = token.parse().map_err(|_| CaptchaError::SolveFailure {
            recognized: recognized.to_string(),
            reason: format!("operand {:?} is out of range", token),
        })?;
    }

    Ok((operands[0], operands[1]))
}

/// Render the answer with no added formatting
pub fn compute_answer(a: i64, b: i64) -> String {
    (a + b).to_string()
}

/// External OCR capability: best-effort recognition, no semantic contract
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in a PNG bitmap, restricted to the whitelist, under
    /// an optional single-line assumption
    async fn recognize(&self, png: &[u8], whitelist: &str, single_line: bool) -> Result<String>;
}

/// OCR via the system `tesseract` binary
pub struct TesseractOcr {
    binary: String,
}

impl TesseractOcr {
    /// Use a specific tesseract executable
    pub fn with_binary<S: Into<String>>(binary: S) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::with_binary("tesseract")
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, png: &[u8], whitelist: &str, single_line: bool) -> Result<String> {
        let scratch = tempfile::Builder::new()
            .prefix("captcha-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| CaptchaError::OcrFailed(format!("scratch file: {e}")))?;

        let mut file = tokio::fs::File::create(scratch.path())
            .await
            .map_err(|e| CaptchaError::OcrFailed(format!("scratch file: {e}")))?;
        file.write_all(png)
            .await
            .map_err(|e| CaptchaError::OcrFailed(format!("scratch file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| CaptchaError::OcrFailed(format!("scratch file: {e}")))?;

        let psm = if single_line { "7" } else { "6" };
        let output = tokio::process::Command::new(&self.binary)
            .arg(scratch.path())
            .arg("stdout")
            .arg("--psm")
            .arg(psm)
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={whitelist}"))
            .output()
            .await
            .map_err(|e| CaptchaError::OcrFailed(format!("{}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptchaError::OcrFailed(stderr.trim().to_string()).into());
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(?text, "OCR recognized");
        Ok(text)
    }
}

/// The full solving pipeline over an injected OCR engine
pub struct CaptchaSolver {
    ocr: Arc<dyn OcrEngine>,
}

impl CaptchaSolver {
    /// Build a solver around an OCR engine
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr }
    }

    /// Solve a raw challenge bitmap into a complete [`CaptchaChallenge`]
    #[instrument(skip(self, raw_png), fields(bytes = raw_png.len()))]
    pub async fn solve(&self, raw_png: Vec<u8>) -> Result<CaptchaChallenge> {
        let binarized_png = binarize_png(&raw_png)?;
        let recognized = self
            .ocr
            .recognize(&binarized_png, OCR_WHITELIST, true)
            .await?;
        let operands = parse_operands(&recognized)?;
        let answer = compute_answer(operands.0, operands.1);
        debug!(%recognized, %answer, "challenge solved");

        Ok(CaptchaChallenge {
            raw_png,
            binarized_png,
            recognized,
            operands,
            answer,
        })
    }
}
