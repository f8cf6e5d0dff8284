use std::collections::HashSet;

use thiserror::Error;

/// Why a suppression could not be registered.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SuppressionError {
    /// The id contains characters outside `[A-Za-z0-9_]` or is empty
    #[error("Failed to add suppression. Invalid id \"{0}\"")]
    InvalidId(String),
    /// The same id/file/line triple was registered twice
    #[error("Suppression \"{0}\" already exists")]
    Duplicate(String),
}

/// One registered suppression: diagnostics with this id at this location are
/// muted by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Suppression {
    /// Diagnostic id to mute
    pub id: String,
    /// File the suppression applies to
    pub file: String,
    /// Line the suppression applies to
    pub line: usize,
}

/// Registry of suppressions collected from inline `cppcheck-suppress`
/// comments. The preprocessor only fills it; filtering reported diagnostics
/// against it is the caller's job.
#[derive(Clone, Debug, Default)]
pub struct Suppressions {
    entries: Vec<Suppression>,
}

impl Suppressions {
    /// Register a suppression.
    ///
    /// # Errors
    /// Returns `SuppressionError` if the id is malformed or the exact same
    /// suppression already exists.
    pub fn add(&mut self, id: &str, file: &str, line: usize) -> Result<(), SuppressionError> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SuppressionError::InvalidId(id.to_string()));
        }
        if self
            .entries
            .iter()
            .any(|s| s.id == id && s.file == file && s.line == line)
        {
            return Err(SuppressionError::Duplicate(id.to_string()));
        }
        self.entries.push(Suppression {
            id: id.to_string(),
            file: file.to_string(),
            line,
        });
        Ok(())
    }

    /// True if a diagnostic with this id/file/line should be muted.
    #[must_use]
    pub fn is_suppressed(&self, id: &str, file: &str, line: usize) -> bool {
        self.entries
            .iter()
            .any(|s| s.id == id && s.file == file && s.line == line)
    }

    /// All registered suppressions, in registration order.
    #[must_use]
    pub fn entries(&self) -> &[Suppression] {
        &self.entries
    }
}

/// Caller-supplied knobs for a preprocessing run.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    /// Extra defines in canonical configuration form (`A;B=1`). When
    /// non-empty, configuration enumeration is skipped and exactly this
    /// configuration is preprocessed.
    pub user_defines: String,
    /// Collect `cppcheck-suppress` comments into [`Suppressions`]
    pub inline_suppressions: bool,
    /// Emit `debug` diagnostics for configurations that cannot be handled
    pub debug_warnings: bool,
    /// Suppressions collected during preprocessing
    pub suppressions: Suppressions,
    enabled: HashSet<String>,
}

impl Settings {
    /// Settings with everything off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable an optional diagnostic id, e.g. `missingInclude`.
    pub fn enable(&mut self, id: &str) {
        self.enabled.insert(id.to_string());
    }

    /// Is the optional diagnostic id enabled?
    #[must_use]
    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.contains(id)
    }
}
