//! Error taxonomy of the document import.
//!
//! Every failure of a block or document maps to one `ExtractionError`
//! variant and is collected as an [`ImportError`] next to the records that
//! could be built. Only [`ExtractionError::ShapeDefect`] aborts a batch.

use serde::{Deserialize, Serialize};

/// Failure while turning document text into records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractionError {
    /// No registered document shape matched the text starting at `line`.
    #[error("No document shape matched: {line}")]
    NoShapeMatched { line: String },

    /// A shape was selected but one of its mandatory fields is absent or unparsable.
    #[error("Required field '{field}' missing in {shape}: {reason}")]
    RequiredFieldMissing {
        shape: String,
        field: String,
        reason: String,
    },

    /// Declared and computed amounts disagree beyond tolerance.
    #[error("Unit reconciliation mismatch for {what}: declared {declared}, computed {computed}")]
    UnitReconciliationMismatch {
        what: String,
        declared: String,
        computed: String,
    },

    /// Records sharing a merge key cannot be combined unambiguously.
    #[error("Merge ambiguity for {key}: {reason}")]
    MergeAmbiguity { key: String, reason: String },

    /// Registry currency differs from the document and no rate converts between them.
    #[error("Security {identifier} is kept in {registry_currency}, document states {document_currency} without exchange rate")]
    RegistryConflict {
        identifier: String,
        registry_currency: String,
        document_currency: String,
    },

    /// A shape definition is broken. This is a bug, not bad input.
    #[error("Invalid shape definition {shape}: {reason}")]
    ShapeDefect { shape: String, reason: String },
}

impl ExtractionError {
    pub fn required(shape: &str, field: &str, reason: impl Into<String>) -> Self {
        Self::RequiredFieldMissing {
            shape: shape.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn mismatch(what: &str, declared: impl ToString, computed: impl ToString) -> Self {
        Self::UnitReconciliationMismatch {
            what: what.to_string(),
            declared: declared.to_string(),
            computed: computed.to_string(),
        }
    }

    pub fn defect(shape: &str, reason: impl Into<String>) -> Self {
        Self::ShapeDefect {
            shape: shape.to_string(),
            reason: reason.into(),
        }
    }

    /// Defects abort the batch, everything else is collected
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::ShapeDefect { .. })
    }
}

/// A collected, non-fatal error with the document (and block) it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{document}: {error}")]
pub struct ImportError {
    /// Name of the source document
    pub document: String,
    /// First line of the failing block, if the failure is block specific
    pub block: Option<String>,
    pub error: ExtractionError,
}

impl ImportError {
    pub fn new(document: impl Into<String>, block: Option<String>, error: ExtractionError) -> Self {
        Self {
            document: document.into(),
            block,
            error,
        }
    }
}

/// Failure to parse a single field value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("signed literal '{0}' not allowed, direction comes from the document type")]
    SignedLiteral(String),

    #[error("invalid date '{0}'")]
    InvalidDate(String),

    #[error("invalid time '{0}'")]
    InvalidTime(String),

    #[error("invalid currency code '{0}'")]
    InvalidCurrency(String),

    #[error("invalid ISIN '{0}'")]
    InvalidIsin(String),

    #[error("invalid WKN '{0}'")]
    InvalidWkn(String),

    #[error("exchange rate must be positive, got '{0}'")]
    InvalidRate(String),

    #[error("no value for '{0}'")]
    Missing(String),
}

/// A field value error, tagged with the field it occurred in.
///
/// Shape sections return this; the matcher lifts it into
/// [`ExtractionError::RequiredFieldMissing`] with the shape name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {source}")]
pub struct FieldError {
    pub field: String,
    #[source]
    pub source: ValueError,
}

impl FieldError {
    pub fn new(field: &str, source: ValueError) -> Self {
        Self {
            field: field.to_string(),
            source,
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(field, ValueError::Missing(field.to_string()))
    }

    pub fn into_extraction_error(self, shape: &str) -> ExtractionError {
        ExtractionError::required(shape, &self.field, self.source.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExtractionError::mismatch("amount", "EUR 19359.18", "EUR 19359.20");
        assert_eq!(
            err.to_string(),
            "Unit reconciliation mismatch for amount: declared EUR 19359.18, computed EUR 19359.20"
        );

        let collected = ImportError::new("Kauf.txt", Some("Wertpapierkauf".to_string()), err);
        assert!(collected.to_string().starts_with("Kauf.txt: Unit reconciliation"));
    }

    #[test]
    fn test_field_error_lifts_into_required_field() {
        let err = FieldError::new("amount", ValueError::SignedLiteral("-1,00".to_string()))
            .into_extraction_error("comdirect purchase");
        match err {
            ExtractionError::RequiredFieldMissing { shape, field, .. } => {
                assert_eq!(shape, "comdirect purchase");
                assert_eq!(field, "amount");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_error_serialization_is_tagged() {
        let err = ExtractionError::NoShapeMatched {
            line: "Kontoauszug".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"kind":"NO_SHAPE_MATCHED","line":"Kontoauszug"}"#);
        assert!(!err.is_defect());
    }
}
