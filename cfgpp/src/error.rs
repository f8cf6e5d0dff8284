use std::fmt;

/// Severity of a reported diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Hard errors that make the output unreliable
    Error,
    /// Stylistic findings, e.g. a missing user header
    Style,
    /// Internal debug findings, gated by `Settings::debug_warnings`
    Debug,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Style => f.write_str("style"),
            Severity::Debug => f.write_str("debug"),
        }
    }
}

/// A single diagnostic produced while preprocessing.
///
/// Diagnostics carry a short machine-readable `id` (e.g. `missingInclude`,
/// `syntaxError`) plus the file and line the finding refers to. `line` is 0
/// when no meaningful location exists.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Machine readable identifier, e.g. `missingInclude`
    pub id: String,
    /// How serious the finding is
    pub severity: Severity,
    /// Human readable message
    pub message: String,
    /// File the diagnostic refers to
    pub file: String,
    /// 1-based line number, or 0 when unknown
    pub line: usize,
    /// The top level file of the translation unit, when known
    pub file0: String,
}

impl Diagnostic {
    /// Create a diagnostic with an empty `file0`.
    #[must_use]
    pub fn new<I, M, F>(id: I, severity: Severity, message: M, file: F, line: usize) -> Self
    where
        I: Into<String>,
        M: Into<String>,
        F: Into<String>,
    {
        Diagnostic {
            id: id.into(),
            severity,
            message: message.into(),
            file: file.into(),
            line,
            file0: String::new(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() && self.line == 0 {
            write!(f, "[{}] ({}) {}", self.id, self.severity, self.message)
        } else {
            write!(
                f,
                "{}:{}: ({}) {} [{}]",
                self.file, self.line, self.severity, self.message, self.id
            )
        }
    }
}

/// Receiver for diagnostics and progress reports.
///
/// The preprocessor never prints anything itself; everything observable goes
/// through this trait. `report_progress` is called periodically from the
/// configuration enumerator and may be used by implementations as a
/// cooperative cancellation point.
pub trait ErrorSink {
    /// Called once per diagnostic.
    fn report_err(&mut self, diag: &Diagnostic);

    /// Called periodically with the current stage and a 0..=100 percentage.
    fn report_progress(&mut self, filename: &str, stage: &str, percent: usize) {
        let _ = (filename, stage, percent);
    }
}

/// An [`ErrorSink`] that stores every diagnostic, mainly for tests and batch
/// processing.
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// All diagnostics reported so far, in order
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if a diagnostic with the given id was reported.
    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.diagnostics.iter().any(|d| d.id == id)
    }
}

impl ErrorSink for CollectingSink {
    fn report_err(&mut self, diag: &Diagnostic) {
        self.diagnostics.push(diag.clone());
    }
}

pub(crate) fn write_error(
    sink: &mut dyn ErrorSink,
    filename: &str,
    linenr: usize,
    id: &str,
    message: &str,
) {
    sink.report_err(&Diagnostic::new(id, Severity::Error, message, filename, linenr));
}
