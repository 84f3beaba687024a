//! registry-search - CAPTCHA-Gated Registry Search Automation
//!
//! This crate automates a CAPTCHA-gated web registry name search end to
//! end: stealth navigation to the search page, term submission, arithmetic
//! CAPTCHA capture and solving, and structured result extraction.
//!
//! # Architecture
//!
//! ```text
//! Caller ──▶ Orchestrator (state machine)
//!                │
//!       ┌────────┼──────────────┐
//!       ▼        ▼              ▼
//!  ┌─────────┐ ┌──────────┐ ┌────────────┐
//!  │ Browser │ │ Captcha  │ │ Extraction │
//!  │ session │ │ pipeline │ │            │
//!  └────┬────┘ └────┬─────┘ └─────┬──────┘
//!       │           │             │
//!       ▼           ▼             ▼
//!  interception  binarize+OCR  records or
//!  + capture     + parse       inline error
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use registry_search::captcha::TesseractOcr;
//! use registry_search::config::SearchConfig;
//! use registry_search::search::run_search;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SearchConfig::default();
//!     let outcome = run_search("Commenda", config, Arc::new(TesseractOcr::default())).await?;
//!
//!     for record in outcome.records() {
//!         println!("{:?}", record);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod captcha;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod retry;
pub mod search;

// Re-exports for convenience
pub use browser::{BrowserSession, RequestClassifier, RequestDecision, ResponseCapture};
pub use captcha::{CaptchaChallenge, CaptchaSolver, OcrEngine, TesseractOcr};
pub use config::{SearchConfig, Selectors};
pub use error::{Error, Result};
pub use retry::{run_with_retry, RetryPolicy};
pub use search::{run_search, SearchFailure, SearchOutcome, SearchRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
