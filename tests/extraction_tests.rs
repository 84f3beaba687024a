//! Result extraction tests
//!
//! Exercises the raw-HTML extraction path and the record model through the
//! public API.

use pretty_assertions::assert_eq;
use registry_search::search::{ResultExtractor, SearchRecord};
use registry_search::SearchOutcome;

const RESULTS_PAGE: &str = r#"
<html><body>
  <div id="masterdata-search-result">
    <table>
      <thead>
        <tr><th>CIN</th><th>Company Name</th><th>Date of Incorporation</th><th>Status</th></tr>
      </thead>
      <tbody>
        <tr>
          <td>L12345MH2001PLC000001</td>
          <td> Commenda Trading Limited </td>
          <td>12/03/2001</td>
          <td>Active</td>
        </tr>
        <tr>
          <td>U67890DL2015PTC000002</td>
          <td>Commenda Services Private Limited</td>
          <td>01/07/2015</td>
          <td>Active</td>
        </tr>
        <tr>
          <td>AAB-1234</td>
          <td>Commenda Advisors LLP</td>
          <td>19/11/2019</td>
          <td>Active</td>
        </tr>
      </tbody>
    </table>
  </div>
</body></html>
"#;

#[test]
fn extracts_n_rows_in_document_order() {
    let records =
        ResultExtractor::extract_from_html(RESULTS_PAGE, "#masterdata-search-result table")
            .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].get("cin"), Some("L12345MH2001PLC000001"));
    assert_eq!(records[1].get("cin"), Some("U67890DL2015PTC000002"));
    assert_eq!(records[2].get("cin"), Some("AAB-1234"));
}

#[test]
fn header_names_are_logical_and_values_trimmed() {
    let records =
        ResultExtractor::extract_from_html(RESULTS_PAGE, "#masterdata-search-result table")
            .unwrap();
    assert_eq!(
        records[0].get("company_name"),
        Some("Commenda Trading Limited")
    );
    assert_eq!(records[0].get("date_of_incorporation"), Some("12/03/2001"));
    // raw markup and raw header text are gone
    assert_eq!(records[0].get("Company Name"), None);
}

#[test]
fn empty_table_yields_zero_records_without_raising() {
    let html = r#"
        <table id="results">
          <thead><tr><th>CIN</th><th>Company Name</th></tr></thead>
          <tbody></tbody>
        </table>
    "#;
    let records = ResultExtractor::extract_from_html(html, "#results").unwrap();
    assert!(records.is_empty());
}

#[test]
fn missing_table_is_an_error_not_empty_success() {
    let err = ResultExtractor::extract_from_html("<div>no table here</div>", "#results")
        .unwrap_err();
    assert!(err.to_string().contains("not present"));
}

#[test]
fn records_serialize_flat() {
    let records =
        ResultExtractor::extract_from_html(RESULTS_PAGE, "#masterdata-search-result table")
            .unwrap();
    let json = serde_json::to_value(&records[0]).unwrap();
    assert_eq!(json["cin"], "L12345MH2001PLC000001");
    assert_eq!(json["status"], "Active");
}

#[test]
fn outcome_with_records_serializes_with_tag() {
    let records: Vec<SearchRecord> =
        ResultExtractor::extract_from_html(RESULTS_PAGE, "#masterdata-search-result table")
            .unwrap();
    let outcome = SearchOutcome::Records { records };
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["outcome"], "records");
    assert_eq!(json["records"].as_array().unwrap().len(), 3);
}
