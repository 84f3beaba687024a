//! CAPTCHA acquisition and solving
//!
//! The challenge is a short arithmetic expression ("A + B") rendered onto a
//! canvas inside a modal. Acquisition rasterizes exactly the challenge
//! region; the solver binarizes the bitmap, runs whitelisted OCR, and
//! parses the expression. Ambiguous OCR output is a hard failure, never a
//! guess.

pub mod acquire;
pub mod solver;

pub use acquire::CaptchaAcquirer;
pub use solver::{CaptchaSolver, OcrEngine, TesseractOcr};

/// One CAPTCHA challenge, alive for a single submission attempt
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    /// PNG of the challenge region as captured
    pub raw_png: Vec<u8>,
    /// PNG after black/white binarization
    pub binarized_png: Vec<u8>,
    /// Raw text the OCR engine produced
    pub recognized: String,
    /// The two parsed integer operands
    pub operands: (i64, i64),
    /// The computed answer as a decimal string
    pub answer: String,
}
