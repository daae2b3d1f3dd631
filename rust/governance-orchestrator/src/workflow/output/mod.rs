//! Output formatting.
//!
//! [`OutputFormatter::format`] never fails: an unknown format or an encoder
//! failure falls back to JSON and reports a low warning instead.
//!
//! | Format  | Payload                                                   |
//! |---------|-----------------------------------------------------------|
//! | json    | results wrapped with metadata and summary statistics      |
//! | csv     | header row plus one row per result                        |
//! | xml     | `<classification_results>` with one `<result>` per item   |
//! | excel   | SpreadsheetML 2003 workbook                               |
//! | parquet | Parquet file with an inferred schema, base64 encoded      |
//! | avro    | Avro object container, base64 encoded                     |

mod columnar;
pub mod columns;
mod delimited;
mod markup;

use std::collections::HashSet;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use governance_services::ClassificationItem;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use super::execution::{ExecutionError, Severity, WorkflowKind};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Json,
    Csv,
    Xml,
    Excel,
    Parquet,
    Avro,
}

impl OutputFormat {
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Parquet => "application/vnd.apache.parquet",
            Self::Csv => "text/csv",
            Self::Xml => "application/xml",
            Self::Excel => "application/vnd.ms-excel",
            Self::Avro => "application/avro",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
            Self::Xml => write!(f, "xml"),
            Self::Excel => write!(f, "excel"),
            Self::Parquet => write!(f, "parquet"),
            Self::Avro => write!(f, "avro"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "xml" => Ok(Self::Xml),
            "excel" | "xls" => Ok(Self::Excel),
            "parquet" => Ok(Self::Parquet),
            "avro" => Ok(Self::Avro),
            _ => Err(format!("Unsupported output format: {s}")),
        }
    }
}

/// How the payload string is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    #[default]
    Text,
    /// Binary content in standard base64.
    Base64,
}

/// Formatted results attached to an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedOutput {
    pub format: OutputFormat,
    pub content_type: String,
    #[serde(default)]
    pub encoding: PayloadEncoding,
    pub payload: String,
    pub generated_at: DateTime<Utc>,
}

/// Execution details embedded in JSON output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputMetadata {
    pub execution_id: String,
    pub workflow_kind: WorkflowKind,
    /// Start of the run, for the wall-clock duration in the summary.
    pub started_at: Option<DateTime<Utc>>,
}

impl OutputMetadata {
    #[must_use]
    pub fn new(execution_id: impl Into<String>, workflow_kind: WorkflowKind) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_kind,
            started_at: None,
        }
    }

    #[must_use]
    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }
}

/// Non-fatal problem found while formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatWarning {
    pub severity: Severity,
    pub message: String,
}

impl FormatWarning {
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    /// Record form for an execution's error list.
    #[must_use]
    pub fn into_execution_error(self) -> ExecutionError {
        ExecutionError::new("OUTPUT_FORMAT_WARNING", self.message, self.severity)
    }
}

/// Result of [`OutputFormatter::format`].
#[derive(Debug, Clone, PartialEq)]
pub struct FormatOutcome {
    pub output: FormattedOutput,
    pub warnings: Vec<FormatWarning>,
}

/// Encoder failure. Triggers the JSON fallback.
#[derive(Debug, Error)]
#[error("{format} encoding failed: {message}")]
pub struct EncodeError {
    format: &'static str,
    message: String,
}

impl EncodeError {
    fn new(format: &'static str, err: impl Display) -> Self {
        Self {
            format,
            message: err.to_string(),
        }
    }
}

/// Payload produced by an encoder.
struct Encoded {
    payload: String,
    warnings: Vec<FormatWarning>,
}

/// Serializes result items.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormatter;

impl OutputFormatter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Format `results` as `format`.
    pub fn format(
        &self,
        results: &[ClassificationItem],
        format: &str,
        metadata: &OutputMetadata,
    ) -> FormatOutcome {
        let mut warnings = Vec::new();

        let requested = match format.parse::<OutputFormat>() {
            Ok(requested) => requested,
            Err(e) => {
                tracing::warn!(
                    execution_id = %metadata.execution_id,
                    format = format,
                    "Unsupported output format, falling back to json"
                );
                warnings.push(FormatWarning::new(
                    Severity::Low,
                    format!("{e}; results were formatted as json"),
                ));
                OutputFormat::Json
            }
        };

        let encoded = match requested {
            OutputFormat::Json => Ok(encode_json(results, metadata)),
            OutputFormat::Parquet => columnar::encode_parquet(&columns::tabulate(results)),
            OutputFormat::Csv => delimited::encode(&columns::tabulate(results)),
            OutputFormat::Xml => markup::encode_xml(&columns::tabulate(results), metadata),
            OutputFormat::Excel => markup::encode_excel(&columns::tabulate(results)),
            OutputFormat::Avro => columnar::encode_avro(&columns::tabulate(results)),
        };

        let (format, encoded) = match encoded {
            Ok(encoded) => (requested, encoded),
            Err(e) => {
                tracing::warn!(
                    execution_id = %metadata.execution_id,
                    error = %e,
                    "Output encoder failed, falling back to json"
                );
                warnings.push(FormatWarning::new(
                    Severity::Low,
                    format!("{e}; results were formatted as json"),
                ));
                (OutputFormat::Json, encode_json(results, metadata))
            }
        };
        warnings.extend(encoded.warnings);

        let encoding = if matches!(format, OutputFormat::Avro | OutputFormat::Parquet) {
            PayloadEncoding::Base64
        } else {
            PayloadEncoding::Text
        };

        FormatOutcome {
            output: FormattedOutput {
                format,
                content_type: format.content_type().to_string(),
                encoding,
                payload: encoded.payload,
                generated_at: Utc::now(),
            },
            warnings,
        }
    }
}

/// JSON document with metadata and summary statistics.
fn encode_json(results: &[ClassificationItem], metadata: &OutputMetadata) -> Encoded {
    let now = Utc::now();
    let count = results.len();
    #[allow(clippy::cast_precision_loss, reason = "result counts are far below 2^52")]
    let average_confidence = if count == 0 {
        0.0
    } else {
        results.iter().map(|r| r.confidence).sum::<f64>() / count as f64
    };
    let unique_labels = results
        .iter()
        .map(|r| r.label.as_str())
        .collect::<HashSet<_>>()
        .len();
    let duration_ms = metadata
        .started_at
        .map_or(0, |start| now.signed_duration_since(start).num_milliseconds().max(0));

    let document = json!({
        "metadata": {
            "execution_id": metadata.execution_id,
            "workflow_kind": metadata.workflow_kind,
            "format": "json",
            "generated_at": now,
        },
        "summary": {
            "count": count,
            "average_confidence": average_confidence,
            "unique_labels": unique_labels,
            "duration_ms": duration_ms,
        },
        "results": results,
    });

    Encoded {
        payload: document.to_string(),
        warnings: Vec::new(),
    }
}
