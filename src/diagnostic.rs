use crate::{Extraction, Position, QuantizeMethod};
use std::fmt;

/// A non-fatal anomaly reported while processing one image.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    /// Source file name as supplied by the caller.
    pub file: String,
    /// What happened.
    pub kind: DiagnosticKind,
}

/// Kinds of [`Diagnostic`].
#[derive(Clone, Debug, PartialEq)]
pub enum DiagnosticKind {
    /// The image was not processed at all.
    Skipped {
        /// Why the image was rejected.
        reason: String,
    },
    /// The requested quantizer failed and another one produced the palette.
    FallbackUsed {
        /// Method that was asked for.
        requested: QuantizeMethod,
        /// Method that produced the palette.
        used: QuantizeMethod,
        /// Why the requested method failed.
        reason: String,
    },
    /// No quantizer produced any color; outputs carry the border only.
    EmptyPalette {
        /// Why the last attempt failed.
        reason: String,
    },
    /// One position could not be rendered or encoded.
    OutputFailed {
        /// The position that failed.
        position: Position,
        /// Why it failed.
        reason: String,
    },
}

impl Diagnostic {
    /// Creates a diagnostic for `file`.
    pub fn new(file: impl Into<String>, kind: DiagnosticKind) -> Self {
        Diagnostic {
            file: file.into(),
            kind,
        }
    }

    /// Diagnostics describing how `extraction` went; empty on a clean first attempt.
    pub fn from_extraction(file: &str, extraction: &Extraction) -> Vec<Diagnostic> {
        let Some(first) = extraction.failures.first() else {
            return Vec::new();
        };

        let kind = match extraction.method {
            Some(used) => DiagnosticKind::FallbackUsed {
                requested: first.method,
                used,
                reason: first.error.to_string(),
            },
            None => {
                let last = extraction.failures.last().unwrap_or(first);
                DiagnosticKind::EmptyPalette {
                    reason: last.error.to_string(),
                }
            }
        };
        vec![Diagnostic::new(file, kind)]
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::Skipped { reason } => write!(f, "{}: skipped: {}", self.file, reason),
            DiagnosticKind::FallbackUsed {
                requested,
                used,
                reason,
            } => write!(
                f,
                "{}: {} failed ({}), palette extracted with {}",
                self.file, requested, reason, used
            ),
            DiagnosticKind::EmptyPalette { reason } => write!(
                f,
                "{}: no palette could be extracted ({}), rendering border only",
                self.file, reason
            ),
            DiagnosticKind::OutputFailed { position, reason } => {
                write!(f, "{}: {} output failed: {}", self.file, position, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailedAttempt, QuantizeError};

    fn failure(method: QuantizeMethod) -> FailedAttempt {
        FailedAttempt {
            method,
            error: QuantizeError::EmptyTable,
        }
    }

    #[test]
    fn clean_extraction_has_no_diagnostics() {
        let extraction = Extraction {
            method: Some(QuantizeMethod::MedianCut),
            ..Extraction::default()
        };
        assert!(Diagnostic::from_extraction("a.png", &extraction).is_empty());
    }

    #[test]
    fn fallback_is_reported_with_both_methods() {
        let extraction = Extraction {
            method: Some(QuantizeMethod::FastOctree),
            failures: vec![failure(QuantizeMethod::MaxCoverage)],
            ..Extraction::default()
        };
        let diagnostics = Diagnostic::from_extraction("a.png", &extraction);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].to_string(),
            "a.png: max-coverage failed (quantizer returned an empty color table), \
             palette extracted with fast-octree"
        );
    }

    #[test]
    fn total_failure_is_an_empty_palette() {
        let extraction = Extraction {
            failures: vec![
                failure(QuantizeMethod::MedianCut),
                failure(QuantizeMethod::FastOctree),
            ],
            ..Extraction::default()
        };
        let diagnostics = Diagnostic::from_extraction("b.jpg", &extraction);
        assert!(matches!(
            diagnostics[0].kind,
            DiagnosticKind::EmptyPalette { .. }
        ));
        assert!(diagnostics[0].to_string().starts_with("b.jpg: no palette"));
    }
}
