//! Browser control module
//!
//! Session lifecycle, anti-detection overrides, navigation with bounded
//! waits, and request interception with out-of-band response capture.

pub mod intercept;
pub mod navigation;
pub mod session;
pub mod stealth;

pub use intercept::{
    NetworkEvent, QuiescenceTracker, RequestClassifier, RequestDecision, ResponseCapture,
};
pub use navigation::{NavigationOutcome, Navigator, WaitPolicy};
pub use session::{BrowserSession, CloseGuard};
pub use stealth::StealthOverrides;
