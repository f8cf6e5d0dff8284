//! Enumeration of the `#ifdef` configurations a translation unit can be
//! compiled under. The result is a sorted, duplicate-free list of canonical
//! configuration strings; the empty string (no extra defines) is always
//! included.

use std::collections::{BTreeSet, HashMap};

use crate::condition;
use crate::config::Settings;
use crate::directive::lines_of;
use crate::error::{Diagnostic, ErrorSink, Severity};
use crate::token;

// A handled configuration is a ';' separated list of IDENT or IDENT=DIGITS
// components. Anything else can only come from conditional syntax the
// enumerator does not model.
fn is_handled_cfg(cfg: &str) -> bool {
    let s = format!("{};", cfg);
    let b = s.as_bytes();
    let mut pos = 0;
    while pos < b.len() {
        let c = b[pos];
        if c == b';' {
            pos += 1;
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            while pos < b.len() && (b[pos].is_ascii_alphanumeric() || b[pos] == b'_') {
                pos += 1;
            }
            if b.get(pos) == Some(&b'=') {
                pos += 1;
                while pos < b.len() && b[pos].is_ascii_digit() {
                    pos += 1;
                }
                if b.get(pos) != Some(&b';') {
                    return false;
                }
            }
            continue;
        }
        return false;
    }
    true
}

/// Extract the condition from a conditional directive line.
///
/// With `def` the line must be an `#ifdef`/`#if`/`#elif` form; with `!def` it
/// must be `#ifndef`. The returned condition has every space removed unless
/// it separates two identifier characters.
pub(crate) fn getdef(line: &str, def: bool) -> String {
    if def
        && !line.starts_with("#ifdef ")
        && !line.starts_with("#if ")
        && !line.starts_with("#elif ")
        && !line.starts_with("#if defined ")
    {
        return String::new();
    }
    if !def && !line.starts_with("#ifndef ") {
        return String::new();
    }

    let mut line = line.to_string();
    if line.starts_with("#if defined ") {
        line.replace_range(0..11, "");
    } else if let Some(space) = line.find(' ') {
        line.replace_range(0..space, "");
    }

    // keep only the spaces that separate two identifiers
    let mut pos = 0;
    while let Some(rel) = line[pos..].find(' ') {
        let p = pos + rel;
        let chprev = if p > 0 { line.as_bytes()[p - 1] } else { 0 };
        let chnext = line.as_bytes().get(p + 1).copied().unwrap_or(0);
        let ident = |c: u8| c.is_ascii_alphanumeric() || c == b'_';
        if ident(chprev) && ident(chnext) {
            pos = p + 1;
        } else {
            line.remove(p);
            pos = p;
        }
    }
    line
}

fn varmap_of(defines: &BTreeSet<String>) -> HashMap<String, String> {
    let mut varmap = HashMap::new();
    for d in defines {
        if let Some(eq) = d.find('=') {
            varmap.insert(d[..eq].to_string(), d[eq + 1..].to_string());
        }
    }
    varmap
}

/// Walk the normalised buffer and collect every configuration. Returns an
/// empty list after reporting an error when an `#if` has unbalanced
/// parentheses.
pub(crate) fn get_configs(
    filedata: &str,
    filename: &str,
    settings: &Settings,
    sink: &mut dyn ErrorSink,
) -> Vec<String> {
    let mut ret: Vec<String> = vec![String::new()];

    let mut deflist: Vec<String> = Vec::new();
    let mut ndeflist: Vec<String> = Vec::new();

    // constants defined through #define in the code, in file order
    let mut defines: BTreeSet<String> = BTreeSet::new();

    // how deep into included files we currently are
    let mut filelevel = 0i32;
    let mut includeguard = false;

    let mut linenr = 0usize;
    for line in lines_of(filedata) {
        linenr += 1;

        sink.report_progress(filename, "Preprocessing (get configurations 1)", 0);

        if line.starts_with("#file ") {
            includeguard = true;
            filelevel += 1;
            continue;
        }
        if line == "#endfile" {
            includeguard = false;
            if filelevel > 0 {
                filelevel -= 1;
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("#define ") {
            match rest.find(' ') {
                None => {
                    defines.insert(rest.to_string());
                }
                Some(space) => {
                    let mut s = rest.to_string();
                    s.replace_range(space..=space, "=");
                    defines.insert(s);
                }
            }
        }

        if !line.is_empty() && !line.starts_with("#if") {
            includeguard = false;
        }
        if includeguard {
            continue;
        }

        let mut from_negation = false;
        let mut def = getdef(line, true);
        if def.is_empty() {
            // sub conditionals of #ifndef blocks are constructed without the
            // negated define
            def = getdef(line, false);
            if !def.is_empty() {
                from_negation = true;
            }
        }

        if !def.is_empty() {
            let mut par = 0i32;
            for b in def.bytes() {
                if b == b'(' {
                    par += 1;
                } else if b == b')' {
                    par -= 1;
                    if par < 0 {
                        break;
                    }
                }
            }
            if par != 0 {
                sink.report_err(&Diagnostic::new(
                    format!("preprocessor{}", line!()),
                    Severity::Error,
                    format!("mismatching number of '(' and ')' in this line: {}", def),
                    filename,
                    linenr,
                ));
                return Vec::new();
            }

            def = condition::simplify_condition(&varmap_of(&defines), &def, false);

            if !deflist.is_empty() && line.starts_with("#elif ") {
                deflist.pop();
            }
            deflist.push(def);

            let mut cfg = String::new();
            for it in &deflist {
                if it == "0" {
                    break;
                }
                if it == "1" || it == "!" {
                    continue;
                }
                // treat two and more equal nested conditions as one
                if &cfg != it {
                    if !cfg.is_empty() {
                        cfg.push(';');
                    }
                    cfg.push_str(it);
                }
            }
            if from_negation {
                let negated = deflist.pop().unwrap_or_default();
                ndeflist.push(negated);
                deflist.push("!".to_string());
            }

            if !ret.contains(&cfg) {
                ret.push(cfg);
            }
        } else if line.starts_with("#else") && !deflist.is_empty() {
            if deflist.last().map(String::as_str) == Some("!") {
                deflist.pop();
                if let Some(nd) = ndeflist.pop() {
                    deflist.push(nd);
                }
            } else {
                let flipped = if deflist.last().map(String::as_str) == Some("1") {
                    "0"
                } else {
                    "1"
                };
                deflist.pop();
                deflist.push(flipped.to_string());
            }
        } else if line.starts_with("#endif") && !deflist.is_empty() {
            if deflist.last().map(String::as_str) == Some("!") {
                ndeflist.pop();
            }
            deflist.pop();
        }
    }

    // remove the defined constants from the configurations
    let retsize = ret.len();
    for (count, cfg_entry) in ret.iter_mut().enumerate() {
        sink.report_progress(
            filename,
            "Preprocessing (get configurations 2)",
            (100 * count) / retsize,
        );

        let mut cfg = cfg_entry.clone();
        for d in &defines {
            let define_name = match d.find('=') {
                Some(eq) => &d[..eq],
                None => d.as_str(),
            };

            let mut pos = 0;
            while let Some(rel) = cfg[pos..].find(define_name) {
                let pos1 = pos + rel;
                pos = pos1 + 1;
                if pos1 > 0 && cfg.as_bytes()[pos1 - 1] != b';' {
                    continue;
                }
                let pos2 = pos1 + define_name.len();
                if pos2 < cfg.len() && cfg.as_bytes()[pos2] != b';' {
                    continue;
                }
                pos = pos1;
                cfg.replace_range(pos1..pos2, "");
            }
        }
        if cfg.len() != cfg_entry.len() {
            while cfg.starts_with(';') {
                cfg.remove(0);
            }
            while cfg.ends_with(';') {
                cfg.pop();
            }
            while let Some(p) = cfg.find(";;") {
                cfg.remove(p);
            }
            *cfg_entry = cfg;
        }
    }

    // "defined(A)&&defined(B)" -> "A;B"
    for cfg in ret.iter_mut() {
        if !cfg.contains("&&") {
            continue;
        }
        let toks = token::tokenize(cfg);
        let mut var_list: Vec<String> = Vec::new();
        let mut i = 0;
        while i < toks.len() {
            let is_defined_call = toks[i] == "defined"
                && toks.get(i + 1).map(String::as_str) == Some("(")
                && toks.get(i + 2).is_some_and(|t| token::is_name(t))
                && toks.get(i + 3).map(String::as_str) == Some(")");
            if is_defined_call {
                var_list.push(toks[i + 2].clone());
                i += 4;
                if toks.get(i).map(String::as_str) == Some("&&") {
                    i += 1;
                }
            } else if token::is_name(&toks[i]) && toks.get(i + 1).map(String::as_str) == Some(";")
            {
                var_list.push(toks[i].clone());
                i += 2;
            } else {
                break;
            }
        }
        var_list.sort();
        let joined = var_list.join(";");
        if !joined.is_empty() {
            *cfg = joined;
        }
    }

    // canonical form: every configuration is a sorted list of defines
    for cfg in ret.iter_mut() {
        let mut defs: Vec<String> = cfg
            .split(';')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        defs.sort_unstable();
        *cfg = defs.join(";");
    }

    ret.sort();
    ret.dedup();

    // throw out configurations that only an unhandled syntax could produce
    ret.retain(|it| {
        let handled = is_handled_cfg(it);
        if !handled && settings.debug_warnings {
            sink.report_err(&Diagnostic::new(
                "debug",
                Severity::Debug,
                format!("unhandled configuration: {}", it),
                "",
                0,
            ));
        }
        handled
    });

    ret
}
