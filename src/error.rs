//! Error types for registry-search
//!
//! This module provides the error type hierarchy using `thiserror`,
//! covering every fatal condition of a search attempt.

use thiserror::Error;

/// The main error type for registry-search operations
#[derive(Error, Debug)]
pub enum Error {
    /// Browser session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Page structure and interaction errors
    #[error("Page error: {0}")]
    Page(#[from] PageError),

    /// CAPTCHA acquisition and solving errors
    #[error("Captcha error: {0}")]
    Captcha(#[from] CaptchaError),

    /// Result extraction errors
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Neither a results table nor an inline error appeared after submission.
    /// Distinct from an explicit empty result set.
    #[error("Ambiguous outcome: neither results nor an error indicator appeared within {0}ms")]
    ResultAmbiguous(u64),

    /// The whole attempt exceeded its overall deadline
    #[error("Attempt timed out after {0}ms")]
    AttemptTimeout(u64),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),
}

/// Browser session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// Failed to create the page
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    /// Session already closed
    #[error("Session already closed")]
    AlreadyClosed,
}

/// Navigation errors
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation timeout
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    /// Page load failed
    #[error("Page load failed: {0}")]
    LoadFailed(String),
}

/// Page structure and interaction errors
#[derive(Error, Debug)]
pub enum PageError {
    /// Required DOM markers missing after load. Fatal: signals a structural
    /// or blocking change in the external page, not a timing issue.
    #[error("Page integrity check failed, missing markers: {missing:?}")]
    IntegrityFailure {
        /// Selectors that were not found
        missing: Vec<String>,
    },

    /// A required interactive element never became visible
    #[error("Element not found: {selector} (waited {timeout_ms}ms)")]
    ElementNotFound {
        /// The selector that was awaited
        selector: String,
        /// How long the wait lasted
        timeout_ms: u64,
    },

    /// The search field did not retain the entered term
    #[error("Input verification failed: entered {expected:?}, field holds {actual:?}")]
    InputMismatch {
        /// Term that was typed
        expected: String,
        /// Value read back from the field
        actual: String,
    },
}

/// CAPTCHA acquisition and solving errors
#[derive(Error, Debug)]
pub enum CaptchaError {
    /// The challenge bitmap could not be decoded
    #[error("Captcha bitmap decode failed: {0}")]
    DecodeFailed(String),

    /// The OCR engine itself failed to run
    #[error("OCR engine failed: {0}")]
    OcrFailed(String),

    /// OCR output did not parse into exactly two integer operands.
    /// Never corrected or fuzzily matched; a misread is a hard failure.
    #[error("Captcha solve failed, recognized text {recognized:?}: {reason}")]
    SolveFailure {
        /// Raw text the OCR engine produced
        recognized: String,
        /// Why parsing rejected it
        reason: String,
    },
}

/// Result extraction errors
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The extractor script failed to run
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    /// The table payload could not be interpreted
    #[error("Result parsing failed: {0}")]
    ParsingFailed(String),
}

/// Result type alias for registry-search operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Whether the failure is an attempt-level condition that a fresh
    /// attempt (new session, new challenge) may clear.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Navigation(_)
                | Error::Captcha(CaptchaError::SolveFailure { .. })
                | Error::ResultAmbiguous(_)
                | Error::AttemptTimeout(_)
        )
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}
