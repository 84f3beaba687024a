//! The form submission state machine
//!
//! Sequences term entry, search trigger, CAPTCHA handling, and answer
//! submission over an exclusively-owned browser session. Every wait is
//! bounded; the whole attempt runs under one overall deadline; the session
//! is released through a single point on every exit path.

use crate::browser::navigation::escape_selector;
use crate::browser::{BrowserSession, NavigationOutcome, Navigator, WaitPolicy};
use crate::captcha::{CaptchaAcquirer, CaptchaChallenge, CaptchaSolver, OcrEngine};
use crate::config::SearchConfig;
use crate::diagnostics::{bounded_capture, DiagnosticsSink};
use crate::error::{CaptchaError, Error, PageError, Result};
use crate::search::{ResultExtractor, SearchFailure, SearchOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// States of one submission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Session launched, nothing loaded
    Init,
    /// Navigation done and all required DOM markers verified
    PageLoaded,
    /// The term is in the search field and read back intact
    TermEntered,
    /// The search action has been triggered
    Submitted,
    /// The CAPTCHA modal is visible
    CaptchaPending,
    /// The challenge has been solved into an answer
    CaptchaSolved,
    /// The answer has been typed and confirmed
    CaptchaSubmitted,
    /// The results table appeared
    ResultReady,
    /// An explicit inline error appeared instead of results
    ResultError,
    /// A fatal condition aborted the attempt
    Failed,
}

impl AttemptState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition(self, next: AttemptState) -> bool {
        use AttemptState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Init, PageLoaded)
                | (PageLoaded, TermEntered)
                | (TermEntered, Submitted)
                | (Submitted, CaptchaPending)
                // validation rejected the term before a challenge was shown
                | (Submitted, ResultError)
                | (CaptchaPending, CaptchaSolved)
                | (CaptchaSolved, CaptchaSubmitted)
                | (CaptchaSubmitted, ResultReady)
                | (CaptchaSubmitted, ResultError)
        )
    }

    /// Whether the attempt is over in this state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptState::ResultReady | AttemptState::ResultError | AttemptState::Failed
        )
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Drives one search attempt over one browser session
pub struct SearchOrchestrator {
    session: BrowserSession,
    config: SearchConfig,
    solver: CaptchaSolver,
    sink: DiagnosticsSink,
    state: AttemptState,
}

impl SearchOrchestrator {
    /// Launch a session and build the orchestrator around it
    pub async fn launch(config: SearchConfig, ocr: Arc<dyn OcrEngine>) -> Result<Self> {
        let session = BrowserSession::launch(&config).await?;
        let sink = DiagnosticsSink::new(config.diagnostics_dir.clone());
        Ok(Self {
            session,
            solver: CaptchaSolver::new(ocr),
            sink,
            config,
            state: AttemptState::Init,
        })
    }

    /// Run the attempt to completion. The session is released exactly once
    /// whatever happens: success, expected failure, or deadline expiry.
    #[instrument(skip(self))]
    pub async fn run(mut self, term: &str) -> std::result::Result<SearchOutcome, SearchFailure> {
        let bound = Duration::from_millis(self.config.attempt_timeout_ms);
        let result = match tokio::time::timeout(bound, self.run_inner(term)).await {
            Ok(result) => result,
            Err(_) => Err(Error::AttemptTimeout(self.config.attempt_timeout_ms)),
        };

        match result {
            Ok(outcome) => {
                if let Err(e) = self.session.close().await {
                    warn!("session close failed: {e}");
                }
                Ok(outcome)
            }
            Err(error) => {
                if !self.state.is_terminal() {
                    self.advance(AttemptState::Failed);
                }
                let mut diagnostics = bounded_capture(
                    Duration::from_secs(5),
                    self.sink.capture_failure(self.session.page()),
                )
                .await;
                if let Error::Captcha(CaptchaError::SolveFailure { recognized, .. }) = &error {
                    diagnostics.recognized_text = Some(recognized.clone());
                }
                if let Err(e) = self.session.close().await {
                    warn!("session close failed: {e}");
                }
                Err(SearchFailure { error, diagnostics })
            }
        }
    }

    async fn run_inner(&mut self, term: &str) -> Result<SearchOutcome> {
        // Init → PageLoaded
        let nav = Navigator::goto(
            self.session.page(),
            self.session.capture(),
            &self.config.target_url,
            WaitPolicy::DomContentLoaded,
            self.config.navigation_timeout_ms,
        )
        .await?;
        self.verify_integrity(nav).await?;
        self.advance(AttemptState::PageLoaded);

        // PageLoaded → TermEntered
        self.enter_term(term).await?;
        self.advance(AttemptState::TermEntered);

        // TermEntered → Submitted
        self.trigger_search().await?;
        self.advance(AttemptState::Submitted);

        // Submitted → CaptchaPending → CaptchaSolved
        let challenge = match self.acquire_challenge().await {
            Ok(raw) => {
                self.advance(AttemptState::CaptchaPending);
                let challenge = self.solver.solve(raw).await?;
                self.sink
                    .save_captcha_frames(&challenge.raw_png, &challenge.binarized_png)
                    .await;
                self.advance(AttemptState::CaptchaSolved);
                challenge
            }
            Err(err) => {
                // Distinguish "validation rejected before a CAPTCHA was
                // ever shown" from "CAPTCHA rendering is merely slow"
                if matches!(err, Error::Page(PageError::ElementNotFound { .. })) {
                    if let Some(message) = self.inline_error_text().await {
                        self.advance(AttemptState::ResultError);
                        return Ok(SearchOutcome::Rejected { message });
                    }
                }
                return Err(err);
            }
        };

        // CaptchaSolved → CaptchaSubmitted
        self.submit_answer(&challenge).await?;
        self.advance(AttemptState::CaptchaSubmitted);

        // CaptchaSubmitted → {ResultReady | ResultError | ambiguous}
        self.await_outcome().await
    }

    /// Verify the required DOM markers, against the live DOM or, on a
    /// fallback navigation, against the captured response body.
    async fn verify_integrity(&self, nav: NavigationOutcome) -> Result<()> {
        let page = self.session.page();
        let markers = self.config.selectors.integrity_markers();
        let mut missing = Vec::new();

        match nav {
            NavigationOutcome::Completed => {
                for marker in markers {
                    if !Navigator::marker_present(page, marker).await? {
                        missing.push(marker.to_string());
                    }
                }
            }
            NavigationOutcome::FallbackCapture => {
                let html = self.session.capture().get().unwrap_or_default();
                debug!(html_len = html.len(), "verifying against captured response");
                for marker in markers {
                    let needle = marker.trim_start_matches(['#', '.']);
                    if !html.contains(needle) {
                        missing.push(marker.to_string());
                    }
                }
            }
        }

        info!(
            missing = missing.len(),
            fallback = nav == NavigationOutcome::FallbackCapture,
            url = ?Navigator::current_url(page).await,
            "page verification"
        );

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PageError::IntegrityFailure { missing }.into())
        }
    }

    /// Fill the search field and require the value to read back intact,
    /// which detects silent input suppression.
    async fn enter_term(&self, term: &str) -> Result<()> {
        let selector = &self.config.selectors.search_input;
        let page = self.session.page();
        let input = page
            .find_element(selector.as_str())
            .await
            .map_err(|_| PageError::ElementNotFound {
                selector: selector.clone(),
                timeout_ms: 0,
            })?;
        input.click().await?;
        input.type_str(term).await?;

        let value = Navigator::read_input_value(page, selector).await?;
        if value != term {
            return Err(PageError::InputMismatch {
                expected: term.to_string(),
                actual: value,
            }
            .into());
        }
        debug!(%term, "term entered and verified");
        Ok(())
    }

    /// Trigger the search. A navigation may race alongside; its absence is
    /// the expected common case, since the modal usually appears in place.
    async fn trigger_search(&self) -> Result<()> {
        let selector = &self.config.selectors.search_trigger;
        let page = self.session.page();
        let trigger = page
            .find_element(selector.as_str())
            .await
            .map_err(|_| PageError::ElementNotFound {
                selector: selector.clone(),
                timeout_ms: 0,
            })?;
        trigger.click().await?;

        // Non-fatal navigation race
        let _ = tokio::time::timeout(Duration::from_millis(3000), page.wait_for_navigation()).await;
        self.session
            .quiescence()
            .settle(Duration::from_millis(1500))
            .await;
        Ok(())
    }

    async fn acquire_challenge(&self) -> Result<Vec<u8>> {
        CaptchaAcquirer::acquire(
            self.session.page(),
            &self.config.selectors,
            self.config.captcha_timeout_ms,
        )
        .await
    }

    /// Clear any pre-filled answer, type the computed answer with
    /// per-character pacing, and confirm with the keyboard. The external
    /// form validates keyboard entry, not button clicks.
    async fn submit_answer(&self, challenge: &CaptchaChallenge) -> Result<()> {
        let selector = &self.config.selectors.captcha_input;
        let page = self.session.page();
        let input = page
            .find_element(selector.as_str())
            .await
            .map_err(|_| PageError::ElementNotFound {
                selector: selector.clone(),
                timeout_ms: 0,
            })?;

        let clear = format!(
            "const el = document.querySelector('{}'); if (el) el.value = '';",
            escape_selector(selector)
        );
        page.evaluate(clear.as_str()).await?;

        input.click().await?;
        for ch in challenge.answer.chars() {
            input.type_str(ch.to_string()).await?;
            tokio::time::sleep(Duration::from_millis(self.config.type_delay_ms)).await;
        }
        input.press_key("Enter").await?;

        info!(answer = %challenge.answer, "captcha answer submitted");
        Ok(())
    }

    /// Wait for the results table or the inline error; neither within the
    /// bound is a distinct ambiguous failure, never silent "zero results".
    async fn await_outcome(&mut self) -> Result<SearchOutcome> {
        let bound = self.config.result_timeout_ms;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(bound);

        self.session
            .quiescence()
            .settle(Duration::from_millis(1500))
            .await;

        loop {
            let results_selector = self.config.selectors.results_table.clone();
            if self.element_visible(&results_selector).await {
                self.advance(AttemptState::ResultReady);
                let records = ResultExtractor::extract_from_page(
                    self.session.page(),
                    &self.config.selectors.results_table,
                )
                .await?;
                return Ok(SearchOutcome::Records { records });
            }
            if let Some(message) = self.inline_error_text().await {
                self.advance(AttemptState::ResultError);
                return Ok(SearchOutcome::Rejected { message });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::ResultAmbiguous(bound));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Quick non-waiting visibility probe
    async fn element_visible(&self, selector: &str) -> bool {
        let script = format!(
            r#"
            (() => {{
                const el = document.querySelector('{}');
                if (!el) return false;
                const rect = el.getBoundingClientRect();
                const style = window.getComputedStyle(el);
                return rect.width > 0 && rect.height > 0 &&
                    style.visibility !== 'hidden' && style.display !== 'none';
            }})()
            "#,
            escape_selector(selector)
        );
        match self.session.page().evaluate(script.as_str()).await {
            Ok(value) => value.into_value::<bool>().unwrap_or(false),
            Err(_) => false,
        }
    }

    /// The inline error text, when the indicator is visible and non-empty
    async fn inline_error_text(&self) -> Option<String> {
        let selector = self.config.selectors.inline_error.clone();
        if !self.element_visible(&selector).await {
            return None;
        }
        let script = format!(
            r#"
            (() => {{
                const el = document.querySelector('{}');
                return el ? el.innerText.trim() : '';
            }})()
            "#,
            escape_selector(&selector)
        );
        let text: String = self
            .session
            .page()
            .evaluate(script.as_str())
            .await
            .ok()?
            .into_value()
            .ok()?;
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// The current attempt state
    pub fn state(&self) -> AttemptState {
        self.state
    }

    fn advance(&mut self, next: AttemptState) {
        if !self.state.can_transition(next) {
            warn!(from = %self.state, to = %next, "illegal state transition");
        }
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::AttemptState::*;

    #[test]
    fn test_happy_path_is_legal() {
        let path = [
            Init,
            PageLoaded,
            TermEntered,
            Submitted,
            CaptchaPending,
            CaptchaSolved,
            CaptchaSubmitted,
            ResultReady,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_captcha_pending_requires_submission_sequence() {
        // The only way into CaptchaPending is through Submitted, which
        // itself requires TermEntered after PageLoaded.
        assert!(!Init.can_transition(CaptchaPending));
        assert!(!PageLoaded.can_transition(CaptchaPending));
        assert!(!TermEntered.can_transition(CaptchaPending));
        assert!(Submitted.can_transition(CaptchaPending));
    }

    #[test]
    fn test_any_active_state_can_fail() {
        for state in [
            Init,
            PageLoaded,
            TermEntered,
            Submitted,
            CaptchaPending,
            CaptchaSolved,
            CaptchaSubmitted,
        ] {
            assert!(state.can_transition(Failed));
        }
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        for terminal in [ResultReady, ResultError, Failed] {
            assert!(terminal.is_terminal());
            for next in [
                Init,
                PageLoaded,
                TermEntered,
                Submitted,
                CaptchaPending,
                CaptchaSolved,
                CaptchaSubmitted,
                ResultReady,
                ResultError,
                Failed,
            ] {
                assert!(!terminal.can_transition(next));
            }
        }
    }

    #[test]
    fn test_submission_can_reject_before_captcha() {
        assert!(Submitted.can_transition(ResultError));
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!PageLoaded.can_transition(Init));
        assert!(!Submitted.can_transition(TermEntered));
        assert!(!CaptchaSubmitted.can_transition(CaptchaPending));
    }
}
