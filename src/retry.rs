//! Attempt-level retry policy
//!
//! Layered above the core: each retry is a whole fresh attempt with its own
//! browser session. The core itself never reruns anything; a wrong CAPTCHA
//! answer or a stalled page fails the attempt, and this policy decides
//! whether to go again.

use crate::captcha::OcrEngine;
use crate::config::SearchConfig;
use crate::search::{run_search, SearchFailure, SearchOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bounded retry with fixed backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first (minimum 1)
    pub attempts: u32,
    /// Delay between attempts in milliseconds
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 2000,
        }
    }
}

/// Run attempts until one succeeds, the failure is not retryable, or the
/// attempt budget is spent. Fresh session per attempt.
pub async fn run_with_retry(
    term: &str,
    config: &SearchConfig,
    ocr: Arc<dyn OcrEngine>,
    policy: RetryPolicy,
) -> Result<SearchOutcome, SearchFailure> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        info!(attempt, attempts, "starting search attempt");
        match run_search(term, config.clone(), Arc::clone(&ocr)).await {
            Ok(outcome) => return Ok(outcome),
            Err(failure) => {
                if attempt >= attempts || !failure.error.is_retryable() {
                    return Err(failure);
                }
                warn!(attempt, "attempt failed ({}), backing off", failure.error);
                tokio::time::sleep(Duration::from_millis(policy.backoff_ms)).await;
            }
        }
    }
}
