//! Pipeline tests
//!
//! End-to-end coverage of the solver pipeline over a stubbed OCR engine,
//! plus the request classification and capture behavior that frames a
//! search attempt. Browser-dependent paths are exercised only up to the
//! driver seam.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use registry_search::captcha::{CaptchaSolver, OcrEngine};
use registry_search::search::AttemptState;
use registry_search::{RequestClassifier, RequestDecision, ResponseCapture, Result};
use std::io::Cursor;
use std::sync::Arc;

/// OCR stub returning a canned recognition
struct CannedOcr(&'static str);

#[async_trait]
impl OcrEngine for CannedOcr {
    async fn recognize(&self, _png: &[u8], _whitelist: &str, _single_line: bool) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn challenge_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(90, 28, |x, y| {
        // rough glyph-on-gradient texture
        let v = ((x * 3 + y * 5) % 256) as u8;
        if (x / 7 + y / 7) % 2 == 0 {
            Rgba([10, 10, 10, 255])
        } else {
            Rgba([v, v, v, 255])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

#[tokio::test]
async fn challenge_solved_end_to_end() {
    let solver = CaptchaSolver::new(Arc::new(CannedOcr("12+7")));
    let challenge = solver.solve(challenge_png()).await.unwrap();

    assert_eq!(challenge.recognized, "12+7");
    assert_eq!(challenge.operands, (12, 7));
    assert_eq!(challenge.answer, "19");
    assert!(!challenge.raw_png.is_empty());
    assert!(!challenge.binarized_png.is_empty());
}

#[tokio::test]
async fn garbled_recognition_fails_with_recognized_text() {
    let solver = CaptchaSolver::new(Arc::new(CannedOcr("I2+7")));
    let err = solver.solve(challenge_png()).await.unwrap_err();
    // the raw recognized text travels with the failure for diagnostics
    assert!(err.to_string().contains("I2+7"));
}

#[tokio::test]
async fn three_term_expression_fails() {
    let solver = CaptchaSolver::new(Arc::new(CannedOcr("7+5+3")));
    assert!(solver.solve(challenge_png()).await.is_err());
}

#[test]
fn classifier_covers_the_three_actions() {
    let classifier = RequestClassifier::new("https://registry.example/search.html", "/home");

    match classifier.classify("https://registry.example/search.html") {
        RequestDecision::ContinueWithHeaders(headers) => {
            let names: Vec<&str> = headers.iter().map(|(n, _)| n.as_str()).collect();
            assert!(names.contains(&"Accept"));
            assert!(names.contains(&"Sec-Fetch-Site"));
        }
        other => panic!("target should continue with headers, got {other:?}"),
    }

    assert_eq!(
        classifier.classify("https://registry.example/home"),
        RequestDecision::Abort
    );
    assert_eq!(
        classifier.classify("https://registry.example/assets/app.js"),
        RequestDecision::Continue
    );
}

#[test]
fn capture_slot_keeps_first_body_only() {
    let capture = ResponseCapture::new();
    assert!(capture.fill("<html>initial</html>".to_string()));
    assert!(!capture.fill("<html>mutated</html>".to_string()));
    assert_eq!(capture.get().as_deref(), Some("<html>initial</html>"));
}

#[test]
fn attempt_states_enforce_submission_order() {
    use AttemptState::*;

    // CaptchaPending is unreachable without the full entry sequence
    assert!(!Init.can_transition(CaptchaPending));
    assert!(!TermEntered.can_transition(CaptchaPending));
    assert!(Submitted.can_transition(CaptchaPending));

    // one challenge per submission: no path back into CaptchaPending
    assert!(!CaptchaSolved.can_transition(CaptchaPending));
    assert!(!CaptchaSubmitted.can_transition(CaptchaPending));

    // ambiguity and rejection are distinct terminals
    assert!(CaptchaSubmitted.can_transition(ResultReady));
    assert!(CaptchaSubmitted.can_transition(ResultError));
    assert!(CaptchaSubmitted.can_transition(Failed));
}
