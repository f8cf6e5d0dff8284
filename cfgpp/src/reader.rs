//! First stage of preprocessing: turn raw bytes into a clean, comment-free
//! buffer with stable line numbering. Removed content is always replaced by
//! an equivalent number of newlines so later passes can report correct line
//! numbers without a side table.

use crate::config::Settings;
use crate::directive;
use crate::error::{write_error, ErrorSink};

fn is_space_or_cntrl(ch: u8) -> bool {
    ch == b' ' || ch.is_ascii_control()
}

/// Byte-level cleanup of the input stream:
///
/// - `\r\n` and lone `\r` become `\n`
/// - whitespace and control bytes collapse to single spaces; spaces after a
///   newline or a `#` are dropped
/// - a backslash-newline joins two physical lines, and the swallowed newlines
///   are re-emitted after the next real one
/// - a space is forced between `#` and a following `(` or `!` so directive
///   names tokenise unambiguously
pub(crate) fn normalize_raw(code: &str) -> String {
    let folded;
    let code = if code.contains('\r') {
        folded = code.replace("\r\n", "\n").replace('\r', "\n");
        folded.as_str()
    } else {
        code
    };

    let bytes = code.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut ignore_space = true;
    let mut need_space = false;
    let mut newlines = 0usize;

    let mut i = 0;
    while i < bytes.len() {
        let mut ch = bytes[i];
        i += 1;

        if ch & 0x80 == 0 && ch != b'\n' && is_space_or_cntrl(ch) {
            ch = b' ';
        }

        if ch == b' ' && ignore_space {
            continue;
        }
        ignore_space = ch == b' ' || ch == b'#' || ch == b'\n';

        if need_space {
            if ch == b'(' || ch == b'!' {
                out.push(b' ');
            } else if !ch.is_ascii_alphabetic() {
                need_space = false;
            }
        }
        if ch == b'#' {
            need_space = true;
        }

        if ch == b'\\' {
            // gcc compatible: trailing whitespace between the backslash and
            // the newline does not break the continuation
            while i < bytes.len() && bytes[i] != b'\n' && is_space_or_cntrl(bytes[i]) {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b'\n' {
                newlines += 1;
                i += 1;
            } else {
                out.push(b'\\');
            }
        } else {
            out.push(ch);
            if ch == b'\n' && newlines > 0 {
                out.extend(std::iter::repeat(b'\n').take(newlines));
                newlines = 0;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn has_bom(s: &[u8]) -> bool {
    s.len() > 3 && s[0] == 0xef && s[1] == 0xbb && s[2] == 0xbf
}

fn starts_at(s: &[u8], i: usize, what: &[u8]) -> bool {
    s.len() >= i + what.len() && &s[i..i + what.len()] == what
}

/// Strip `//` and `/* */` comments, keeping string/char literals and line
/// counts intact. Raw strings are rewritten into ordinary literals. Inline
/// `cppcheck-suppress` markers are registered with the suppression registry
/// when `Settings::inline_suppressions` is on.
///
/// `#error` survives with its message dropped; `#warning` is dropped whole.
pub(crate) fn remove_comments(
    input: &str,
    filename: &str,
    settings: &mut Settings,
    sink: &mut dyn ErrorSink,
) -> String {
    let s = input.as_bytes();
    let mut lineno: usize = 1;

    // newlines swallowed inside comments/literals, re-emitted after the next
    // real newline so the line count stays stable
    let mut newlines = 0usize;
    let mut code: Vec<u8> = Vec::with_capacity(s.len());
    let mut previous: u8 = 0;
    let mut suppression_ids: Vec<String> = Vec::new();

    let mut i = if has_bom(s) { 3 } else { 0 };
    while i < s.len() {
        let ch = s[i];

        if ch & 0x80 != 0 {
            let errmsg = format!(
                "The code contains characters that are unhandled. \
                 Neither unicode nor extended ascii are supported. \
                 (line={}, character code={:x})",
                lineno,
                ch as u32
            );
            write_error(sink, filename, lineno, "syntaxError", &errmsg);
        }

        if starts_at(s, i, b"#error") || starts_at(s, i, b"#warning") {
            if starts_at(s, i, b"#error") {
                code.extend_from_slice(b"#error");
            }
            match input[i..].find('\n') {
                None => break,
                Some(rel) => {
                    i += rel;
                    continue;
                }
            }
        }

        // A line without comments has ended; register pending suppressions
        if ch == b'\n' && !suppression_ids.is_empty() {
            for id in suppression_ids.drain(..) {
                if let Err(err) = settings.suppressions.add(&id, filename, lineno) {
                    write_error(sink, filename, lineno, "cppcheckError", &err.to_string());
                }
            }
        }

        if starts_at(s, i, b"//") {
            let comment_start = i + 2;
            match input[i..].find('\n') {
                None => break,
                Some(rel) => {
                    i += rel;
                    if settings.inline_suppressions {
                        let comment = &input[comment_start..i];
                        let mut words = comment.split_whitespace();
                        if words.next() == Some("cppcheck-suppress") {
                            if let Some(id) = words.next() {
                                suppression_ids.push(id.to_string());
                            }
                        }
                    }
                    code.push(b'\n');
                    previous = b'\n';
                    lineno += 1;
                    i += 1;
                }
            }
        } else if starts_at(s, i, b"/*") {
            let mut ch_prev = 0u8;
            let mut cur = ch;
            i += 1;
            while i < s.len() && !(ch_prev == b'*' && cur == b'/') {
                ch_prev = cur;
                i += 1;
                cur = s.get(i).copied().unwrap_or(0);
                if cur == b'\n' {
                    newlines += 1;
                    lineno += 1;
                }
            }
            i += 1;
        } else if ch == b'"' || ch == b'\'' {
            code.push(ch);
            loop {
                i += 1;
                let ch_next = s.get(i).copied().unwrap_or(0);
                if ch_next == b'\\' {
                    i += 1;
                    let ch_seq = s.get(i).copied().unwrap_or(0);
                    if ch_seq == b'\n' {
                        newlines += 1;
                    } else if ch_seq != 0 {
                        code.push(ch_next);
                        code.push(ch_seq);
                        previous = ch_seq;
                    }
                } else if ch_next != 0 {
                    code.push(ch_next);
                    previous = ch_next;
                }
                if i >= s.len() || ch_next == ch || ch_next == b'\n' {
                    break;
                }
            }
            i += 1;
        } else if starts_at(s, i, b"R\"") {
            let mut delim = String::new();
            let mut i2 = i + 2;
            while i2 < s.len() {
                if delim.len() > 16
                    || is_space_or_cntrl(s[i2])
                    || s[i2] == b')'
                    || s[i2] == b'\\'
                {
                    delim = " ".to_string();
                    break;
                } else if s[i2] == b'(' {
                    break;
                }
                delim.push(s[i2] as char);
                i2 += 1;
            }
            let terminator = format!("){}\"", delim);
            let endpos = input[i..].find(&terminator).map(|rel| i + rel);
            if delim != " " && endpos.is_some() {
                let endpos = endpos.unwrap_or(0);
                let mut rawstring_newlines = 0usize;
                code.push(b'"');
                for &c in &s[i + 3 + delim.len()..endpos] {
                    if c == b'\n' {
                        rawstring_newlines += 1;
                        code.extend_from_slice(b"\\n");
                    } else if is_space_or_cntrl(c) {
                        code.push(b' ');
                    } else if c == b'\\' {
                        code.push(b'\\');
                    } else if c == b'"' || c == b'\'' {
                        code.push(b'\\');
                        code.push(c);
                    } else {
                        code.push(c);
                    }
                }
                code.push(b'"');
                for _ in 0..rawstring_newlines {
                    code.push(b'\n');
                }
                lineno += rawstring_newlines;
                i = endpos + delim.len() + 2;
            } else {
                code.push(b'R');
                previous = b'R';
                i += 1;
            }
        } else {
            if ch == b' ' && previous == b' ' {
                // squash double spaces
            } else {
                code.push(ch);
                previous = ch;
            }

            if ch == b'\n' {
                lineno += 1;
                if newlines > 0 {
                    code.extend(std::iter::repeat(b'\n').take(newlines));
                    newlines = 0;
                    previous = b'\n';
                }
            }
            i += 1;
        }
    }

    String::from_utf8_lossy(&code).into_owned()
}

/// The full read pipeline for one file: byte normalisation, comment
/// scrubbing, parenthesis cleanup. Used for the top level file and for every
/// inlined header.
pub(crate) fn read(
    code: &str,
    filename: &str,
    settings: &mut Settings,
    sink: &mut dyn ErrorSink,
) -> String {
    let raw = normalize_raw(code);
    let without_comments = remove_comments(&raw, filename, settings, sink);
    directive::remove_parentheses(&without_comments)
}

/// Drop spaces that touch a newline on either side.
pub(crate) fn remove_space_near_nl(s: &str) -> String {
    let b = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(b.len());
    let mut prev = 0u8;
    for (i, &c) in b.iter().enumerate() {
        if c == b' ' && (prev == b'\n' || b.get(i + 1) == Some(&b'\n')) {
            // swallowed
        } else {
            out.push(c);
            prev = c;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Tabs become spaces, leading indentation is dropped, and spaces adjacent to
/// newlines are removed.
pub(crate) fn normalize_whitespace(processed: &str) -> String {
    let mut tmp = processed.replace('\t', " ");
    if tmp.starts_with(' ') {
        tmp = tmp.trim_start_matches(' ').to_string();
    }
    remove_space_near_nl(&tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingSink;

    fn clean(code: &str) -> String {
        let mut settings = Settings::new();
        let mut sink = CollectingSink::new();
        let raw = normalize_raw(code);
        remove_comments(&raw, "test.c", &mut settings, &mut sink)
    }

    #[test]
    fn crlf_becomes_lf() {
        assert_eq!(normalize_raw("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn spaces_collapse() {
        assert_eq!(normalize_raw("int    a ;\n"), "int a ;\n");
        assert_eq!(normalize_raw("\n   int a;\n"), "\nint a;\n");
    }

    #[test]
    fn space_after_hash_is_dropped_and_forced_before_paren() {
        assert_eq!(normalize_raw("#  if A\n"), "#if A\n");
        assert_eq!(normalize_raw("#if(A)\n"), "#if (A)\n");
        // the space before the parenthesis is stripped again by the
        // directive normaliser
        assert_eq!(normalize_raw("#if!defined(A)\n"), "#if !defined (A)\n");
    }

    #[test]
    fn backslash_newline_preserves_line_count() {
        let out = normalize_raw("#define M 1\\\n+2\nx\n");
        assert_eq!(out, "#define M 1+2\n\nx\n");
        assert_eq!(out.matches('\n').count(), 3);
    }

    #[test]
    fn line_comment_becomes_newline() {
        assert_eq!(clean("a // hello\nb\n"), "a \nb\n");
    }

    #[test]
    fn block_comment_keeps_line_count() {
        let out = clean("a /* one\ntwo\nthree */ b\nc\n");
        assert_eq!(out.matches('\n').count(), 4);
        assert!(out.starts_with("a "));
    }

    #[test]
    fn string_literals_survive() {
        assert_eq!(clean("s = \"// not a comment\";\n"), "s = \"// not a comment\";\n");
        assert_eq!(clean("c = '\\'';\n"), "c = '\\'';\n");
    }

    #[test]
    fn error_directive_body_is_dropped() {
        assert_eq!(clean("#error you lose\nx\n"), "#error\nx\n");
        assert_eq!(clean("#warning careful\nx\n"), "\nx\n");
    }

    #[test]
    fn raw_string_is_rewritten() {
        let out = clean("s = R\"(a\nb)\";\n");
        assert!(out.contains("\"a\\nb\""));
        assert_eq!(out.matches('\n').count(), 2);
    }

    #[test]
    fn non_ascii_is_reported() {
        let mut settings = Settings::new();
        let mut sink = CollectingSink::new();
        let raw = normalize_raw("int \u{00e4} = 1;\n");
        let _ = remove_comments(&raw, "test.c", &mut settings, &mut sink);
        assert!(sink.contains_id("syntaxError"));
    }

    #[test]
    fn suppression_comment_is_registered() {
        let mut settings = Settings::new();
        settings.inline_suppressions = true;
        let mut sink = CollectingSink::new();
        let raw = normalize_raw("// cppcheck-suppress nullPointer\n*p = 0;\n");
        let _ = remove_comments(&raw, "test.c", &mut settings, &mut sink);
        assert_eq!(settings.suppressions.entries().len(), 1);
        assert_eq!(settings.suppressions.entries()[0].id, "nullPointer");
        assert_eq!(settings.suppressions.entries()[0].line, 2);
    }

    #[test]
    fn whitespace_normalisation() {
        assert_eq!(normalize_whitespace("\tint a;\n  x;\n"), "int a;\nx;\n");
        assert_eq!(remove_space_near_nl("a \n b\n"), "a\nb\n");
    }
}
