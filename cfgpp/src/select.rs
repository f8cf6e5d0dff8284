//! Second pass over the normalised buffer: for one chosen configuration,
//! keep the live branches and blank everything else. `#define`, `#undef`,
//! `#file` and `#endfile` survive selection (the expander consumes them);
//! every other directive is blanked but keeps its line position.

use crate::condition;
use crate::config::Settings;
use crate::configs;
use crate::directive::lines_of;
use crate::error::{write_error, ErrorSink};
use crate::macros;
use crate::token;

/// Produce the preprocessed text for configuration `cfg`.
///
/// Returns the empty string when a live `#error` is hit (additionally
/// reported as `preprocessorErrorDirective` when user defines are in effect)
/// or when macro expansion fails fatally.
pub(crate) fn get_code(
    filedata: &str,
    cfg: &str,
    filename: &str,
    settings: &Settings,
    sink: &mut dyn ErrorSink,
) -> String {
    let mut lineno: usize = 0;
    let mut ret = String::with_capacity(filedata.len());

    let mut matched = true;
    let mut matching_ifdef: Vec<bool> = Vec::new();
    let mut matched_ifdef: Vec<bool> = Vec::new();

    let mut cfgmap = condition::cfg_to_map(cfg);

    let lines = lines_of(filedata);
    let mut idx = 0;
    while idx < lines.len() {
        let mut line = lines[idx].to_string();
        idx += 1;
        lineno += 1;

        if line.starts_with("#pragma asm") {
            ret.push('\n');
            let mut found_end = false;
            while idx < lines.len() {
                line = lines[idx].to_string();
                idx += 1;
                if line.starts_with("#pragma endasm") {
                    found_end = true;
                    break;
                }
                ret.push('\n');
            }
            if !found_end {
                break;
            }

            if line.contains('=') {
                let tail: String = line.chars().skip(15).collect();
                let toks = token::tokenize(&tail);
                let shape_ok = toks.len() >= 5
                    && toks[0] == "("
                    && token::is_name(&toks[1])
                    && toks[2] == "="
                    && toks[4] == ")";
                if shape_ok {
                    ret.push_str(&format!("asm({});", toks[1]));
                }
            }
            ret.push('\n');
            continue;
        }

        let def = configs::getdef(&line, true);
        let ndef = configs::getdef(&line, false);

        if line.starts_with("#define ") {
            // later conditions must see this define
            let rest = &line[8..];
            match rest.find(|c| c == ' ' || c == '(') {
                None => {
                    cfgmap.insert(rest.to_string(), String::new());
                }
                Some(p) if rest.as_bytes()[p] == b' ' => {
                    cfgmap.insert(rest[..p].to_string(), rest[p + 1..].to_string());
                }
                Some(p) => {
                    cfgmap.insert(rest[..p].to_string(), String::new());
                }
            }
        } else if line.starts_with("#elif ") {
            // an #elif without an open #if is ignored
            if let Some(&was_matched) = matched_ifdef.last() {
                if was_matched {
                    if let Some(m) = matching_ifdef.last_mut() {
                        *m = false;
                    }
                } else if condition::match_cfg_def(&cfgmap, &def) {
                    if let Some(m) = matching_ifdef.last_mut() {
                        *m = true;
                    }
                    if let Some(m) = matched_ifdef.last_mut() {
                        *m = true;
                    }
                }
            }
        } else if !def.is_empty() {
            let is_match = condition::match_cfg_def(&cfgmap, &def);
            matching_ifdef.push(is_match);
            matched_ifdef.push(is_match);
        } else if !ndef.is_empty() {
            let is_match = !condition::match_cfg_def(&cfgmap, &ndef);
            matching_ifdef.push(is_match);
            matched_ifdef.push(is_match);
        } else if line == "#else" {
            if let Some(&was_matched) = matched_ifdef.last() {
                if let Some(m) = matching_ifdef.last_mut() {
                    *m = !was_matched;
                }
            }
        } else if line.starts_with("#endif") {
            matched_ifdef.pop();
            matching_ifdef.pop();
        }

        if line.starts_with('#') {
            matched = matching_ifdef.iter().all(|&m| m);
        }

        if matched && line.starts_with("#error") {
            if !settings.user_defines.is_empty() {
                write_error(sink, filename, lineno, "preprocessorErrorDirective", &line);
            }
            return String::new();
        }

        if !matched && line.starts_with("#define ") {
            // a define that is not part of this configuration
            line.clear();
        } else if line.starts_with("#file \"")
            || line.starts_with("#endfile")
            || line.starts_with("#define ")
            || line.starts_with("#undef")
        {
            // keep; removing these would corrupt the line numbering
        } else if !matched || line.starts_with('#') {
            line.clear();
        }

        ret.push_str(&line);
        ret.push('\n');
    }

    macros::expand_macros(&ret, filename, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingSink;

    fn code_for(src: &str, cfg: &str) -> String {
        let settings = Settings::new();
        let mut sink = CollectingSink::new();
        get_code(src, cfg, "test.c", &settings, &mut sink)
    }

    #[test]
    fn default_configuration_takes_else() {
        let src = "#ifdef WIN32\na;\n#else\nb;\n#endif\n";
        assert_eq!(code_for(src, ""), "\n\n\nb;\n\n");
        assert_eq!(code_for(src, "WIN32"), "\na;\n\n\n\n");
    }

    #[test]
    fn ifndef_selects_inverse() {
        let src = "#ifndef ABC\na;\n#else\nb;\n#endif\n";
        assert_eq!(code_for(src, ""), "\na;\n\n\n\n");
        assert_eq!(code_for(src, "ABC"), "\n\n\nb;\n\n");
    }

    #[test]
    fn elif_chain() {
        let src = "#if A\na;\n#elif B\nb;\n#else\nc;\n#endif\n";
        assert_eq!(code_for(src, "A"), "\na;\n\n\n\n\n\n");
        assert_eq!(code_for(src, "B"), "\n\n\nb;\n\n\n\n");
        assert_eq!(code_for(src, ""), "\n\n\n\n\nc;\n\n");
        // the first matching branch wins
        assert_eq!(code_for(src, "A;B"), "\na;\n\n\n\n\n\n");
    }

    #[test]
    fn define_updates_configuration() {
        // the #define survives selection and is then consumed by expansion
        let src = "#define DEBUG\n#ifdef DEBUG\nx;\n#endif\n";
        assert_eq!(code_for(src, ""), "\n\nx;\n\n");
    }

    #[test]
    fn define_with_value_feeds_conditions() {
        let src = "#define LEVEL 2\n#if LEVEL == 2\nx;\n#endif\n";
        assert_eq!(code_for(src, ""), "\n\nx;\n\n");
    }

    #[test]
    fn dead_define_is_blanked() {
        // the define text is dropped from the output, but the name still
        // feeds the configuration map for later conditions
        let src = "#ifdef A\n#define INSIDE\n#endif\n#ifdef INSIDE\nx;\n#endif\n";
        let out = code_for(src, "");
        assert!(!out.contains("INSIDE"));
        assert!(out.contains("x;"));
    }

    #[test]
    fn error_on_live_branch_empties_configuration() {
        let src = "#ifdef A\n#error b0rked\n#endif\n";
        assert_eq!(code_for(src, "A"), "");
        assert_eq!(code_for(src, ""), "\n\n\n");
    }

    #[test]
    fn error_reported_with_user_defines() {
        let mut settings = Settings::new();
        settings.user_defines = "A".to_string();
        let mut sink = CollectingSink::new();
        let src = "#ifdef A\n#error b0rked\n#endif\n";
        let out = get_code(src, "A", "test.c", &settings, &mut sink);
        assert_eq!(out, "");
        assert!(sink.contains_id("preprocessorErrorDirective"));
    }

    #[test]
    fn file_sentinels_survive_selection() {
        let src = "#file \"inc.h\"\nint i;\n#endfile\nx;\n";
        let out = code_for(src, "");
        assert!(out.contains("#file \"inc.h\""));
        assert!(out.contains("#endfile"));
    }

    #[test]
    fn stray_else_and_endif_are_ignored() {
        let src = "#else\n#endif\nx;\n";
        assert_eq!(code_for(src, ""), "\n\nx;\n");
    }

    #[test]
    fn pragma_asm_region_is_blanked() {
        let src = "#pragma asm\nmov a, b\n#pragma endasm\nx;\n";
        assert_eq!(code_for(src, ""), "\n\n\nx;\n");
    }

    #[test]
    fn pragma_endasm_assignment_keeps_result() {
        let src = "#pragma asm\nmov a\n#pragma endasm ( rVal = x )\ny;\n";
        let out = code_for(src, "");
        assert!(out.contains("asm(rVal);"));
    }

    #[test]
    fn nested_conditionals() {
        let src = "#ifdef A\n#ifdef B\nab;\n#endif\na;\n#endif\n";
        assert_eq!(code_for(src, "A;B"), "\n\nab;\n\na;\n\n");
        assert_eq!(code_for(src, "A"), "\n\n\n\na;\n\n");
        assert_eq!(code_for(src, ""), "\n\n\n\n\n\n");
    }
}
