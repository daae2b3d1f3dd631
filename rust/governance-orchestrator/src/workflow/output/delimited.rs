//! CSV encoding.

use super::columns::{cell_text, Table};
use super::{EncodeError, Encoded, FormatWarning};
use crate::workflow::execution::Severity;

/// Encode a table as RFC 4180 CSV with a header row.
///
/// The payload is parsed back and a row-count mismatch is reported as a
/// medium warning.
pub(super) fn encode(table: &Table) -> Result<Encoded, EncodeError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer
        .write_record(&table.columns)
        .map_err(|e| EncodeError::new("csv", e))?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(|cell| cell_text(cell.as_ref())))
            .map_err(|e| EncodeError::new("csv", e))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| EncodeError::new("csv", e.error()))?;
    let payload = String::from_utf8(bytes).map_err(|e| EncodeError::new("csv", e))?;

    let mut warnings = Vec::new();
    match parsed_rows(&payload) {
        Ok(count) if count == table.rows.len() => {}
        Ok(count) => warnings.push(FormatWarning::new(
            Severity::Medium,
            format!(
                "CSV validation found {count} rows, expected {}",
                table.rows.len()
            ),
        )),
        Err(e) => warnings.push(FormatWarning::new(
            Severity::Medium,
            format!("CSV validation failed: {e}"),
        )),
    }

    Ok(Encoded { payload, warnings })
}

fn parsed_rows(payload: &str) -> Result<usize, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(payload.as_bytes());
    let mut count = 0;
    for record in reader.records() {
        record?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use governance_services::ClassificationItem;

    use super::*;
    use crate::workflow::output::columns::tabulate;

    #[test]
    fn test_quotes_embedded_commas_and_quotes() {
        let results = vec![ClassificationItem::new("r1", "Hello, \"World\"", 0.9, "nlp")];
        let encoded = encode(&tabulate(&results)).unwrap();

        assert!(encoded.payload.contains("\"Hello, \"\"World\"\"\""));
        assert!(encoded.warnings.is_empty());

        let mut reader = csv::Reader::from_reader(encoded.payload.as_bytes());
        let headers = reader.headers().unwrap().clone();
        let label_idx = headers.iter().position(|h| h == "label").unwrap();
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[label_idx], "Hello, \"World\"");
    }

    #[test]
    fn test_multiline_values_stay_in_one_row() {
        let results = vec![
            ClassificationItem::new("r1", "line one\nline two", 0.5, "nlp"),
            ClassificationItem::new("r2", "plain", 0.6, "nlp"),
        ];
        let encoded = encode(&tabulate(&results)).unwrap();
        assert!(encoded.warnings.is_empty());
        assert_eq!(parsed_rows(&encoded.payload).unwrap(), 2);
    }

    #[test]
    fn test_empty_results_have_no_rows() {
        let encoded = encode(&tabulate(&[])).unwrap();
        assert!(encoded.warnings.is_empty());
        assert_eq!(parsed_rows(&encoded.payload).unwrap(), 0);
    }
}
