//! Include resolution. `#include` lines are replaced in place by the header
//! body wrapped in `#file "path"` / `#endfile` sentinels, so one buffer holds
//! the whole translation unit while line numbers per file stay recoverable.
//! Every distinct header is inlined at most once, which also breaks include
//! cycles.

use std::collections::HashSet;
use std::fs;

use crate::config::Settings;
use crate::error::{Diagnostic, ErrorSink, Severity};
use crate::paths;
use crate::reader;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HeaderType {
    None,
    User,
    System,
}

// "menu.h" or <menu.h> -> menu.h, with backslashes normalised
fn header_file_name(s: &mut String) -> HeaderType {
    let Some(i) = s.find(|c| c == '<' || c == '"') else {
        s.clear();
        return HeaderType::None;
    };
    let close = if s.as_bytes()[i] == b'<' { '>' } else { '"' };

    let mut result = String::new();
    for c in s[i + 1..].chars() {
        if c == close {
            break;
        }
        result.push(c);
    }
    *s = result.replace('\\', "/");
    if close == '"' {
        HeaderType::User
    } else {
        HeaderType::System
    }
}

fn starts_at(s: &[u8], i: usize, what: &[u8]) -> bool {
    s.len() >= i + what.len() && &s[i..i + what.len()] == what
}

// Line number of the erased #include line, found by walking backwards and
// skipping already inlined #file/#endfile regions.
fn include_line_number(code: &str, pos: usize) -> usize {
    let bytes = code.as_bytes();
    let mut linenr: usize = 1;
    let mut level = 0usize;
    // the newline terminating the erased #include line sits at `pos` itself
    // and must not be counted
    let mut p = 1;
    while p < pos {
        let idx = pos - p;
        if level == 0 && bytes.get(idx) == Some(&b'\n') {
            linenr += 1;
        } else if starts_at(bytes, idx, b"#endfile\n") {
            level += 1;
        } else if starts_at(bytes, idx, b"#file ") {
            if level == 0 {
                linenr = linenr.saturating_sub(1);
                break;
            }
            level -= 1;
        }
        p += 1;
    }
    linenr
}

/// Inline every resolvable `#include` in `code`.
///
/// User headers are searched in the include paths first (include paths are
/// used as plain prefixes, so they should end in a separator) and then
/// relative to the including file. System headers only get the include paths.
/// Unresolvable user headers produce a `missingInclude` diagnostic when that
/// id is enabled.
pub(crate) fn handle_includes(
    code: &mut String,
    file_path: &str,
    include_paths: &[String],
    file0: &str,
    settings: &mut Settings,
    sink: &mut dyn ErrorSink,
) {
    // stack of directories for the currently open #file regions
    let mut dirs: Vec<String> = vec![paths::directory_of(file_path)];
    let mut handled_files: HashSet<String> = HashSet::new();

    let mut pos = 0;
    let mut endfile_pos = 0;
    while let Some(rel) = code[pos..].find("#include") {
        pos += rel;

        // only includes at the start of a line count
        if pos > 0 && code.as_bytes()[pos - 1] != b'\n' {
            pos += 8;
            continue;
        }

        // every #endfile passed since the previous include closes one
        // inlined header, so its directory is no longer interesting
        while let Some(rel2) = code[endfile_pos..].find("\n#endfile") {
            let p = endfile_pos + rel2;
            if p >= pos {
                break;
            }
            dirs.pop();
            endfile_pos = p + 9;
        }
        endfile_pos = pos;

        let end = code[pos..].find('\n').map_or(code.len(), |r| pos + r);
        let mut filename = code[pos..end].to_string();
        code.replace_range(pos..end, "");

        let header_type = header_file_name(&mut filename);
        if header_type == HeaderType::None {
            continue;
        }

        let mut raw: Option<String> = None;
        {
            let mut prefixes: Vec<&str> = Vec::with_capacity(include_paths.len() + 1);
            prefixes.push("");
            prefixes.extend(include_paths.iter().map(String::as_str));
            for prefix in prefixes {
                let candidate = format!("{}{}", prefix, filename);
                if let Ok(bytes) = fs::read(&candidate) {
                    raw = Some(String::from_utf8_lossy(&bytes).into_owned());
                    filename = candidate;
                    break;
                }
            }
        }

        if header_type == HeaderType::User && raw.is_none() {
            if let Some(dir) = dirs.last() {
                let candidate = format!("{}{}", dir, filename);
                if let Ok(bytes) = fs::read(&candidate) {
                    raw = Some(String::from_utf8_lossy(&bytes).into_owned());
                    filename = candidate;
                }
            }
        }

        let file_opened = raw.is_some();
        let mut processed_file = String::new();
        if let Some(content) = raw {
            let key = paths::canonical_key(&filename);
            if handled_files.contains(&key) {
                // inlined before; skip to avoid endless inclusion
                continue;
            }
            handled_files.insert(key);
            processed_file = reader::read(&content, &filename, settings, sink);
        }

        if !processed_file.is_empty() {
            let normalized = reader::normalize_whitespace(&processed_file);
            let wrapped = format!("#file \"{}\"\n{}\n#endfile", filename, normalized);
            code.insert_str(pos, &wrapped);
            dirs.push(paths::directory_of(&filename));
        } else if !file_opened
            && header_type == HeaderType::User
            && settings.is_enabled("missingInclude")
        {
            let linenr = include_line_number(code, pos);
            let mut diag = Diagnostic::new(
                "missingInclude",
                Severity::Style,
                format!("Include file: \"{}\" not found.", filename),
                paths::to_native_separators(file_path),
                linenr,
            );
            diag.file0 = file0.to_string();
            sink.report_err(&diag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingSink;

    #[test]
    fn header_name_parsing() {
        let mut s = "#include \"menu.h\"".to_string();
        assert_eq!(header_file_name(&mut s), HeaderType::User);
        assert_eq!(s, "menu.h");

        let mut s = "#include <stdio.h>".to_string();
        assert_eq!(header_file_name(&mut s), HeaderType::System);
        assert_eq!(s, "stdio.h");

        let mut s = "#include foo".to_string();
        assert_eq!(header_file_name(&mut s), HeaderType::None);
        assert_eq!(s, "");
    }

    #[test]
    fn header_name_backslashes_are_fixed() {
        let mut s = "#include \"inc\\menu.h\"".to_string();
        header_file_name(&mut s);
        assert_eq!(s, "inc/menu.h");
    }

    #[test]
    fn missing_user_header_is_reported() {
        let mut settings = Settings::new();
        settings.enable("missingInclude");
        let mut sink = CollectingSink::new();
        let mut code = "#include \"no-such-header-anywhere.h\"\nint x;\n".to_string();
        handle_includes(&mut code, "test.c", &[], "test.c", &mut settings, &mut sink);
        assert!(sink.contains_id("missingInclude"));
        assert_eq!(code, "\nint x;\n");
    }

    #[test]
    fn missing_system_header_is_silent() {
        let mut settings = Settings::new();
        settings.enable("missingInclude");
        let mut sink = CollectingSink::new();
        let mut code = "#include <no-such-header-anywhere.h>\nint x;\n".to_string();
        handle_includes(&mut code, "test.c", &[], "test.c", &mut settings, &mut sink);
        assert!(sink.diagnostics.is_empty());
    }
}
