#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Configuration-enumerating C/C++ preprocessor
//!
//! This library is the preprocessor front-end of a static analyser. Unlike a
//! compiler's preprocessor, which produces the one translation unit selected
//! by the current defines, it discovers **every** `#ifdef` configuration a
//! file can be compiled under and can produce the preprocessed text for each
//! of them, so the analyser can check all of the code instead of one slice.
//!
//! The pipeline normalises the raw bytes (comments out, line numbers kept),
//! inlines includes between `#file`/`#endfile` sentinels, enumerates the
//! configurations, and then selects and macro-expands one configuration at a
//! time.
//!
//! ## Example
//!
//! ```
//! use cfgpp::{CollectingSink, Preprocessor, Settings};
//!
//! let code = "#ifdef DEBUG\nlog();\n#else\nwork();\n#endif\n";
//! let mut sink = CollectingSink::new();
//! let mut pp = Preprocessor::new(Settings::new());
//! let (data, configs) = pp.preprocess(code, "demo.c", &[], &mut sink);
//! assert_eq!(configs, ["", "DEBUG"]);
//!
//! let default_code = pp.get_code(&data, "", "demo.c", &mut sink);
//! assert!(default_code.contains("work();"));
//! let debug_code = pp.get_code(&data, "DEBUG", "demo.c", &mut sink);
//! assert!(debug_code.contains("log();"));
//! ```

mod condition;
mod config;
mod configs;
mod directive;
mod error;
mod includes;
mod macros;
mod paths;
mod preprocessor;
mod reader;
mod select;
mod token;

pub use config::{Settings, Suppression, SuppressionError, Suppressions};
pub use error::{CollectingSink, Diagnostic, ErrorSink, Severity};
pub use paths::{simplify_path, to_native_separators};
pub use preprocessor::Preprocessor;

use std::collections::BTreeMap;
use std::path::Path;

/// Preprocess source text: every enumerated configuration mapped to its
/// preprocessed translation unit.
pub fn preprocess_source(
    code: &str,
    filename: &str,
    settings: Settings,
    sink: &mut dyn ErrorSink,
) -> BTreeMap<String, String> {
    Preprocessor::new(settings).preprocess_all(code, filename, &[], sink)
}

/// Preprocess a file from disk.
///
/// # Errors
/// Returns an error when the file cannot be read; all preprocessing problems
/// are reported through `sink` instead.
pub fn preprocess_file<P: AsRef<Path>>(
    path: P,
    settings: Settings,
    sink: &mut dyn ErrorSink,
) -> std::io::Result<BTreeMap<String, String>> {
    let bytes = std::fs::read(path.as_ref())?;
    let code = String::from_utf8_lossy(&bytes);
    let filename = path.as_ref().to_string_lossy().into_owned();
    Ok(Preprocessor::new(settings).preprocess_all(&code, &filename, &[], sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str) -> (String, Vec<String>) {
        let mut sink = CollectingSink::new();
        let mut pp = Preprocessor::new(Settings::new());
        pp.preprocess(code, "file.c", &[], &mut sink)
    }

    fn expanded(code: &str, cfg: &str) -> String {
        let mut sink = CollectingSink::new();
        let mut pp = Preprocessor::new(Settings::new());
        let (data, _) = pp.preprocess(code, "file.c", &[], &mut sink);
        pp.get_code(&data, cfg, "file.c", &mut sink)
    }

    #[test]
    fn config_enumeration_sequential_blocks() {
        let code = "#ifdef A\nx;\n#else\ny;\n#endif\n#ifndef B\nz;\n#endif\n";
        let (_, configs) = run(code);
        assert_eq!(configs, ["", "A", "B"]);
    }

    #[test]
    fn config_list_is_sorted_unique_with_default() {
        let code = "#ifdef B\nb;\n#endif\n#ifdef A\na;\n#endif\n#ifdef B\nagain;\n#endif\n";
        let (_, configs) = run(code);
        assert_eq!(configs, ["", "A", "B"]);
        let mut sorted = configs.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(configs, sorted);
        assert!(configs.contains(&String::new()));
    }

    #[test]
    fn config_canonical_form() {
        let code = "#ifdef B\n#if defined(C) && defined(A)\nx;\n#endif\n#endif\n";
        let (_, configs) = run(code);
        for cfg in &configs {
            for part in cfg.split(';').filter(|s| !s.is_empty()) {
                let mut chars = part.chars();
                let first = chars.next().unwrap();
                assert!(first.is_ascii_alphabetic() || first == '_', "bad config {cfg}");
            }
            let mut parts: Vec<&str> = cfg.split(';').collect();
            parts.sort_unstable();
            assert_eq!(cfg.split(';').collect::<Vec<_>>(), parts, "unsorted {cfg}");
        }
    }

    #[test]
    fn macro_expansion_nested_call() {
        let out = expanded("#define ADD(a,b) ((a)+(b))\nint x = ADD(1, ADD(2,3));\n", "");
        assert_eq!(out, "\nint x = ((1)+(((2)+(3))));\n");
    }

    #[test]
    fn variadic_comma_elision() {
        let out = expanded("#define LOG(fmt, ...) printf(fmt, ##__VA_ARGS__)\nLOG(\"hi\");\n", "");
        assert_eq!(out, "\nprintf(\"hi\");\n");
    }

    #[test]
    fn stringification() {
        let out = expanded("#define S(x) #x\nputs(S(hello world));\n", "");
        assert_eq!(out, "\nputs(\"hello world\");\n");
    }

    #[test]
    fn backslash_newline_continuation() {
        let code = "#define M 1\\\n +2\nint y = M;\n";
        let (data, _) = run(code);
        assert_eq!(data.matches('\n').count(), code.matches('\n').count());
        let out = expanded(code, "");
        assert_eq!(out, "\n\nint y = 1 +2;\n");
    }

    #[test]
    fn line_count_is_stable_through_normalisation() {
        let code = "a; // comment\n/* multi\nline\ncomment */ b;\n#if (X)\nc;\n#endif\n";
        let (data, _) = run(code);
        assert_eq!(data.matches('\n').count(), code.matches('\n').count());
    }

    #[test]
    fn normalisation_is_idempotent() {
        let code = "int a = 1;   // trailing\n#if ( defined A )\nfoo( a,\tb );\n#endif\nchar *s = \"x /*y*/\";\n";
        let mut sink = CollectingSink::new();
        let mut pp = Preprocessor::new(Settings::new());
        let (once, _) = pp.preprocess(code, "file.c", &[], &mut sink);
        let mut pp2 = Preprocessor::new(Settings::new());
        let (twice, _) = pp2.preprocess(&once, "file.c", &[], &mut sink);
        assert_eq!(once, twice);
    }

    #[test]
    fn conditional_compilation_per_configuration() {
        let code = "#ifdef DEBUG\nint x = 1;\n#else\nint x = 0;\n#endif\n";
        let off = expanded(code, "");
        assert!(off.contains("int x = 0;"));
        assert!(!off.contains("int x = 1;"));
        let on = expanded(code, "DEBUG");
        assert!(on.contains("int x = 1;"));
        assert!(!on.contains("int x = 0;"));
    }

    #[test]
    fn if_with_parentheses_is_normalised() {
        let code = "#if (A)\nx;\n#endif\n";
        let (data, configs) = run(code);
        assert!(data.starts_with("#if A\n"));
        assert_eq!(configs, ["", "A"]);
    }

    #[test]
    fn if_defined_becomes_ifdef() {
        let code = "#if defined(AAA)\nx;\n#endif\n";
        let (data, configs) = run(code);
        assert!(data.starts_with("#ifdef AAA\n"));
        assert_eq!(configs, ["", "AAA"]);
    }

    #[test]
    fn defined_without_parentheses() {
        let code = "#if defined AAA\nx;\n#endif\n";
        let (_, configs) = run(code);
        assert_eq!(configs, ["", "AAA"]);
    }

    #[test]
    fn elif_chain_enumeration_and_selection() {
        let code = "#if A\na;\n#elif B\nb;\n#else\nc;\n#endif\n";
        let (data, configs) = run(code);
        assert_eq!(configs, ["", "A", "B"]);
        let mut sink = CollectingSink::new();
        let pp = Preprocessor::new(Settings::new());
        assert!(pp.get_code(&data, "B", "file.c", &mut sink).contains("b;"));
        assert!(pp.get_code(&data, "", "file.c", &mut sink).contains("c;"));
    }

    #[test]
    fn user_defines_skip_enumeration() {
        let mut settings = Settings::new();
        settings.user_defines = "DEBUG".to_string();
        let mut sink = CollectingSink::new();
        let mut pp = Preprocessor::new(settings);
        let code = "#ifdef DEBUG\nd;\n#endif\n#ifdef OTHER\no;\n#endif\n";
        let (data, configs) = pp.preprocess(code, "file.c", &[], &mut sink);
        assert_eq!(configs, ["DEBUG"]);
        let out = pp.get_code(&data, &configs[0], "file.c", &mut sink);
        assert!(out.contains("d;"));
        assert!(!out.contains("o;"));
    }

    #[test]
    fn preprocess_all_yields_one_unit_per_configuration() {
        let code = "#ifdef A\na;\n#endif\nshared;\n";
        let mut sink = CollectingSink::new();
        let mut pp = Preprocessor::new(Settings::new());
        let result = pp.preprocess_all(code, "file.c", &[], &mut sink);
        assert_eq!(result.keys().collect::<Vec<_>>(), ["", "A"]);
        assert!(result[""].contains("shared;"));
        assert!(!result[""].contains("a;"));
        assert!(result["A"].contains("a;"));
    }

    #[test]
    fn error_directive_empties_configuration() {
        let code = "#ifdef A\n#error do not build this\n#endif\nok;\n";
        let mut sink = CollectingSink::new();
        let mut pp = Preprocessor::new(Settings::new());
        let result = pp.preprocess_all(code, "file.c", &[], &mut sink);
        assert_eq!(result["A"], "");
        assert!(result[""].contains("ok;"));
    }

    #[test]
    fn inline_suppressions_are_collected() {
        let mut settings = Settings::new();
        settings.inline_suppressions = true;
        let mut sink = CollectingSink::new();
        let mut pp = Preprocessor::new(settings);
        let code = "// cppcheck-suppress nullPointer\n*p = 0;\n";
        let _ = pp.preprocess(code, "file.c", &[], &mut sink);
        assert!(pp.settings().suppressions.is_suppressed("nullPointer", "file.c", 2));
    }

    #[test]
    fn error_message_catalogue() {
        let mut sink = CollectingSink::new();
        Preprocessor::error_messages(&mut sink);
        assert!(sink.contains_id("missingInclude"));
        assert!(sink.contains_id("preprocessorErrorDirective"));
    }

    #[test]
    fn pragma_asm_blocks_are_collapsed() {
        let code = "#pragma asm\nmov a,b\n#pragma endasm\nx;\n";
        let out = expanded(code, "");
        assert!(!out.contains("mov"));
        assert!(out.contains("x;"));
    }
}
