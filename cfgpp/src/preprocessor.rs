use std::collections::BTreeMap;

use crate::config::Settings;
use crate::configs;
use crate::directive;
use crate::error::{Diagnostic, ErrorSink, Severity};
use crate::includes;
use crate::reader;
use crate::select;

/// The preprocessor front-end: normalises a translation unit, enumerates its
/// `#ifdef` configurations, and produces the preprocessed text for any of
/// them.
///
/// All state lives for one instance; diagnostics go to the [`ErrorSink`]
/// passed into each call. A typical run is either the one-shot
/// [`preprocess_all`](Preprocessor::preprocess_all), or the two-phase
/// [`preprocess`](Preprocessor::preprocess) followed by
/// [`get_code`](Preprocessor::get_code) per configuration.
pub struct Preprocessor {
    settings: Settings,
    /// top level file of the translation unit, remembered across includes
    file0: String,
}

impl Preprocessor {
    /// Create a preprocessor with the given settings.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Preprocessor {
            settings,
            file0: String::new(),
        }
    }

    /// The settings, including any suppressions collected so far.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Consume the preprocessor and hand the settings back to the caller.
    #[must_use]
    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// First phase: clean up `code`, inline its includes and enumerate the
    /// configurations.
    ///
    /// Returns the normalised buffer and the canonical configuration list.
    /// The list is sorted, duplicate-free and contains the empty (default)
    /// configuration — unless `Settings::user_defines` is set, in which case
    /// enumeration is skipped and the user configuration is the only entry.
    pub fn preprocess(
        &mut self,
        code: &str,
        filename: &str,
        include_paths: &[String],
        sink: &mut dyn ErrorSink,
    ) -> (String, Vec<String>) {
        if self.file0.is_empty() {
            self.file0 = filename.to_string();
        }

        let mut processed = reader::read(code, filename, &mut self.settings, sink);
        processed = reader::normalize_whitespace(&processed);
        directive::remove_asm(&mut processed);
        processed = directive::parenthesize_defined(&processed);
        includes::handle_includes(
            &mut processed,
            filename,
            include_paths,
            &self.file0,
            &mut self.settings,
            sink,
        );
        processed = directive::replace_if_defined(&processed);

        let configurations = if self.settings.user_defines.is_empty() {
            configs::get_configs(&processed, filename, &self.settings, sink)
        } else {
            vec![self.settings.user_defines.clone()]
        };

        (processed, configurations)
    }

    /// Second phase: the selected and macro-expanded text of one
    /// configuration. `filedata` is the buffer returned by
    /// [`preprocess`](Preprocessor::preprocess).
    pub fn get_code(
        &self,
        filedata: &str,
        cfg: &str,
        filename: &str,
        sink: &mut dyn ErrorSink,
    ) -> String {
        select::get_code(filedata, cfg, filename, &self.settings, sink)
    }

    /// One-shot form: preprocessed text for every configuration, keyed by
    /// the canonical configuration string.
    pub fn preprocess_all(
        &mut self,
        code: &str,
        filename: &str,
        include_paths: &[String],
        sink: &mut dyn ErrorSink,
    ) -> BTreeMap<String, String> {
        let (data, configurations) = self.preprocess(code, filename, include_paths, sink);
        let mut result = BTreeMap::new();
        for cfg in configurations {
            let text = self.get_code(&data, &cfg, filename, sink);
            result.insert(cfg, text);
        }
        result
    }

    /// Report one exemplar of each externally visible diagnostic id, so the
    /// caller can enumerate the message catalogue.
    pub fn error_messages(sink: &mut dyn ErrorSink) {
        sink.report_err(&Diagnostic::new(
            "missingInclude",
            Severity::Style,
            "Include file: \"\" not found.",
            "",
            0,
        ));
        sink.report_err(&Diagnostic::new(
            "preprocessorErrorDirective",
            Severity::Error,
            "#error ...",
            "",
            0,
        ));
    }
}
