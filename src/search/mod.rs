//! Search execution: the submission state machine and result extraction
//!
//! The entry contract takes one search term plus a [`SearchConfig`] and
//! returns either the extracted records or a typed failure carrying
//! diagnostics. One attempt owns one browser session; no two attempts
//! share one.

pub mod extract;
pub mod orchestrator;

pub use extract::ResultExtractor;
pub use orchestrator::{AttemptState, SearchOrchestrator};

use crate::captcha::OcrEngine;
use crate::config::SearchConfig;
use crate::diagnostics::Diagnostics;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One extracted row: logical column name → trimmed text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// The row's fields keyed by normalized header name
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl SearchRecord {
    /// Look up a field by logical column name
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Number of populated fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record holds no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The final outcome of a successful attempt
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// Extracted records in document order; may be empty (zero matches)
    Records {
        /// The extracted rows
        records: Vec<SearchRecord>,
    },
    /// The page rejected the search with an explicit inline error
    Rejected {
        /// The captured error text
        message: String,
    },
}

impl SearchOutcome {
    /// The extracted records; empty for a rejection
    pub fn records(&self) -> &[SearchRecord] {
        match self {
            SearchOutcome::Records { records } => records,
            SearchOutcome::Rejected { .. } => &[],
        }
    }
}

/// A fatal attempt failure with its diagnostic context
#[derive(Debug)]
pub struct SearchFailure {
    /// What went wrong
    pub error: Error,
    /// URL, screenshot reference, raw recognized text where relevant
    pub diagnostics: Diagnostics,
}

impl std::fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(url) = &self.diagnostics.url {
            write!(f, " (at {url})")?;
        }
        if let Some(path) = &self.diagnostics.screenshot {
            write!(f, " [screenshot: {}]", path.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for SearchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl SearchFailure {
    /// A failure with no diagnostic context (e.g. the session never started)
    pub fn bare(error: Error) -> Self {
        Self {
            error,
            diagnostics: Diagnostics::default(),
        }
    }
}

/// Run one complete search attempt: launch, navigate, submit, solve,
/// extract, release.
pub async fn run_search(
    term: &str,
    config: SearchConfig,
    ocr: Arc<dyn OcrEngine>,
) -> Result<SearchOutcome, SearchFailure> {
    config.validate().map_err(SearchFailure::bare)?;
    let orchestrator = SearchOrchestrator::launch(config, ocr)
        .await
        .map_err(SearchFailure::bare)?;
    orchestrator.run(term).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_lookup() {
        let mut fields = BTreeMap::new();
        fields.insert("cin".to_string(), "L12345MH2001PLC000001".to_string());
        fields.insert("company_name".to_string(), "Commenda Ltd".to_string());
        let record = SearchRecord { fields };
        assert_eq!(record.get("cin"), Some("L12345MH2001PLC000001"));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.len(), 2);
        assert!(!record.is_empty());
    }

    #[test]
    fn test_outcome_records_accessor() {
        let outcome = SearchOutcome::Records {
            records: vec![SearchRecord::default()],
        };
        assert_eq!(outcome.records().len(), 1);

        let rejected = SearchOutcome::Rejected {
            message: "no match".to_string(),
        };
        assert!(rejected.records().is_empty());
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let rejected = SearchOutcome::Rejected {
            message: "invalid term".to_string(),
        };
        let json = serde_json::to_value(&rejected).unwrap();
        assert_eq!(json["outcome"], "rejected");
        assert_eq!(json["message"], "invalid term");
    }

    #[test]
    fn test_failure_display_includes_url() {
        let failure = SearchFailure {
            error: Error::ResultAmbiguous(20000),
            diagnostics: Diagnostics {
                url: Some("https://example.com".to_string()),
                screenshot: None,
                recognized_text: None,
            },
        };
        let text = failure.to_string();
        assert!(text.contains("Ambiguous"));
        assert!(text.contains("https://example.com"));
    }
}
