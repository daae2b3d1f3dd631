//! XML and SpreadsheetML encodings.

use std::fmt::Write as _;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;

use super::columns::{cell_text, sanitize_name, Table};
use super::{EncodeError, Encoded, FormatWarning, OutputMetadata};
use crate::workflow::execution::Severity;

/// Encode results as an XML document, one `<result>` element per row.
pub(super) fn encode_xml(table: &Table, metadata: &OutputMetadata) -> Result<Encoded, EncodeError> {
    let names: Vec<String> = table
        .columns
        .iter()
        .map(|c| sanitize_name(c, &['-']))
        .collect();

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    writeln!(
        xml,
        "<classification_results execution_id=\"{}\" workflow_kind=\"{}\" count=\"{}\">",
        escape(metadata.execution_id.as_str()),
        metadata.workflow_kind,
        table.rows.len()
    )
    .map_err(|e| EncodeError::new("xml", e))?;

    for row in &table.rows {
        xml.push_str("  <result>\n");
        for (name, cell) in names.iter().zip(row) {
            let Some(value) = cell else { continue };
            writeln!(
                xml,
                "    <{name}>{}</{name}>",
                escape(cell_text(Some(value)).as_str())
            )
            .map_err(|e| EncodeError::new("xml", e))?;
        }
        xml.push_str("  </result>\n");
    }
    xml.push_str("</classification_results>\n");

    let warnings = well_formed_warning("XML", &xml).into_iter().collect();
    Ok(Encoded {
        payload: xml,
        warnings,
    })
}

/// Encode results as a SpreadsheetML 2003 workbook with one worksheet.
pub(super) fn encode_excel(table: &Table) -> Result<Encoded, EncodeError> {
    let mut xml = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<?mso-application progid=\"Excel.Sheet\"?>\n",
        "<Workbook xmlns=\"urn:schemas-microsoft-com:office:spreadsheet\" ",
        "xmlns:ss=\"urn:schemas-microsoft-com:office:spreadsheet\">\n",
        " <Worksheet ss:Name=\"Results\">\n",
        "  <Table>\n",
    ));

    xml.push_str("   <Row>");
    for column in &table.columns {
        push_cell(&mut xml, "String", column).map_err(|e| EncodeError::new("excel", e))?;
    }
    xml.push_str("</Row>\n");

    for row in &table.rows {
        xml.push_str("   <Row>");
        for cell in row {
            let (kind, text) = match cell {
                Some(Value::Number(n)) => ("Number", n.to_string()),
                Some(Value::Bool(b)) => ("Boolean", if *b { "1" } else { "0" }.to_string()),
                other => ("String", cell_text(other.as_ref())),
            };
            push_cell(&mut xml, kind, &text).map_err(|e| EncodeError::new("excel", e))?;
        }
        xml.push_str("</Row>\n");
    }

    xml.push_str("  </Table>\n </Worksheet>\n</Workbook>\n");

    let warnings = well_formed_warning("Excel", &xml).into_iter().collect();
    Ok(Encoded {
        payload: xml,
        warnings,
    })
}

fn push_cell(xml: &mut String, kind: &str, text: &str) -> std::fmt::Result {
    write!(
        xml,
        "<Cell><Data ss:Type=\"{kind}\">{}</Data></Cell>",
        escape(text)
    )
}

/// Parse the document back; a failure becomes a medium warning.
fn well_formed_warning(label: &str, xml: &str) -> Option<FormatWarning> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return None,
            Ok(_) => {}
            Err(e) => {
                return Some(FormatWarning::new(
                    Severity::Medium,
                    format!(
                        "{label} validation failed at position {}: {e}",
                        reader.error_position()
                    ),
                ))
            }
        }
    }
}
