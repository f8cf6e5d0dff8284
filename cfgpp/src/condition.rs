//! Reduction of preprocessor conditions against a configuration map. The
//! same routine serves two callers: the configuration enumerator, which must
//! leave unknown names alone so they can become configurations of their own,
//! and the selector, which needs a definite yes/no answer. `match_mode`
//! selects between the two.

use std::collections::HashMap;

use crate::token;

/// Split a canonical configuration string (`A;B=2`) into a name -> value map.
/// The empty configuration maps the empty name to an empty value, which never
/// collides with a real identifier.
pub(crate) fn cfg_to_map(cfg: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for part in cfg.split(';') {
        match part.find('=') {
            Some(eq) => map.insert(part[..eq].to_string(), part[eq + 1..].to_string()),
            None => map.insert(part.to_string(), String::new()),
        };
    }
    map
}

fn is_bool_left(tok: Option<&String>) -> bool {
    match tok {
        None => true,
        Some(t) => t == "||" || t == "&&" || t == "(",
    }
}

fn is_bool_right(tok: Option<&String>) -> bool {
    match tok {
        None => true,
        Some(t) => t == "||" || t == "&&" || t == ")",
    }
}

/// Reduce `condition` to `"1"`, `"0"` or leave it untouched.
///
/// Names found in `cfg` are substituted by their value (or by `1` when they
/// have none and sit in a boolean position). `defined(NAME)` becomes `1` or,
/// in match mode, `0`; outside match mode an unknown name is left alone.
/// Numeric subexpressions are folded until nothing changes.
pub(crate) fn simplify_condition(
    cfg: &HashMap<String, String>,
    condition: &str,
    match_mode: bool,
) -> String {
    let toks = token::tokenize(&format!("({})", condition));

    // fast paths for the two overwhelmingly common shapes
    if toks.len() == 3 && toks[0] == "(" && token::is_name(&toks[1]) && toks[2] == ")" {
        if cfg.contains_key(&toks[1]) {
            return "1".to_string();
        }
        if match_mode {
            return "0".to_string();
        }
        return condition.to_string();
    }
    if toks.len() == 4
        && toks[0] == "("
        && toks[1] == "!"
        && token::is_name(&toks[2])
        && toks[3] == ")"
    {
        if !cfg.contains_key(&toks[2]) {
            return "1".to_string();
        }
        if match_mode {
            return "0".to_string();
        }
        return condition.to_string();
    }

    // substitute names with values from the configuration
    let mut out: Vec<String> = Vec::with_capacity(toks.len());
    let mut i = 0;
    while i < toks.len() {
        let tok = &toks[i];
        if !token::is_name(tok) {
            out.push(tok.clone());
            i += 1;
            continue;
        }

        if tok == "defined"
            && toks.get(i + 1).map(String::as_str) == Some("(")
            && toks.get(i + 2).is_some_and(|t| token::is_name(t))
            && toks.get(i + 3).map(String::as_str) == Some(")")
        {
            if cfg.contains_key(&toks[i + 2]) {
                out.push("1".to_string());
            } else if match_mode {
                out.push("0".to_string());
            } else {
                out.extend_from_slice(&toks[i..i + 4]);
            }
            i += 4;
            continue;
        }

        if tok == "defined" && toks.get(i + 1).is_some_and(|t| token::is_name(t)) {
            if cfg.contains_key(&toks[i + 1]) {
                out.push("1".to_string());
            } else if match_mode {
                out.push("0".to_string());
            } else {
                out.extend_from_slice(&toks[i..i + 2]);
            }
            i += 2;
            continue;
        }

        match cfg.get(tok) {
            Some(value) if !value.is_empty() => out.push(value.clone()),
            Some(_) => {
                // a define without value only survives in a boolean position
                if is_bool_left(out.last()) && is_bool_right(toks.get(i + 1)) {
                    out.push("1".to_string());
                }
            }
            None => out.push(tok.clone()),
        }
        i += 1;
    }

    // fold constants and `! num` until a fixed point
    loop {
        let mut modified = token::simplify_calculations(&mut out);
        let mut i = 0;
        while i + 1 < out.len() {
            if out[i] == "!" && token::is_number(&out[i + 1]) {
                let value = if out[i + 1] == "0" { "1" } else { "0" };
                out.splice(i..i + 2, [value.to_string()]);
                modified = true;
            } else {
                i += 1;
            }
        }
        if !modified {
            break;
        }
    }

    let starts = |pattern: &[&str]| {
        out.len() >= pattern.len() && out.iter().zip(pattern).all(|(a, b)| a == b)
    };
    if starts(&["(", "1", ")"]) || starts(&["(", "1", "||"]) {
        return "1".to_string();
    }
    if starts(&["(", "0", ")"]) {
        return "0".to_string();
    }
    condition.to_string()
}

/// Does configuration `cfg` satisfy the condition `def`?
pub(crate) fn match_cfg_def(cfg: &HashMap<String, String>, def: &str) -> bool {
    let def = simplify_condition(cfg, def, true);
    if cfg.contains_key(&def) {
        return true;
    }
    def == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(cfg: &str) -> HashMap<String, String> {
        cfg_to_map(cfg)
    }

    #[test]
    fn cfg_map_splits_values() {
        let m = map("A;B=2");
        assert_eq!(m.get("A").map(String::as_str), Some(""));
        assert_eq!(m.get("B").map(String::as_str), Some("2"));
        assert!(!m.contains_key("C"));
    }

    #[test]
    fn plain_name_fast_path() {
        assert_eq!(simplify_condition(&map("A"), "A", true), "1");
        assert_eq!(simplify_condition(&map("B"), "A", true), "0");
        // in enumerate mode a miss stays open
        assert_eq!(simplify_condition(&map("B"), "A", false), "A");
    }

    #[test]
    fn negated_name_fast_path() {
        assert_eq!(simplify_condition(&map("B"), "! A", true), "1");
        assert_eq!(simplify_condition(&map("A"), "! A", true), "0");
    }

    #[test]
    fn defined_call() {
        assert_eq!(simplify_condition(&map("A"), "defined(A)", true), "1");
        assert_eq!(simplify_condition(&map("B"), "defined(A)", true), "0");
        assert_eq!(
            simplify_condition(&map("B"), "defined(A)", false),
            "defined(A)"
        );
    }

    #[test]
    fn value_substitution_folds() {
        assert_eq!(simplify_condition(&map("LEVEL=2"), "LEVEL == 2", true), "1");
        assert_eq!(simplify_condition(&map("LEVEL=1"), "LEVEL == 2", true), "0");
        assert_eq!(simplify_condition(&map("N=4"), "N > 2 && N < 8", true), "1");
    }

    #[test]
    fn empty_value_in_boolean_position() {
        assert_eq!(simplify_condition(&map("A;B"), "A && B", true), "1");
        // an unknown name keeps the condition open; matching still fails
        assert_eq!(simplify_condition(&map("A"), "A && B", true), "A && B");
        assert!(!match_cfg_def(&map("A"), "A && B"));
    }

    #[test]
    fn leading_one_short_circuits_or() {
        assert_eq!(simplify_condition(&map(""), "1 || X", false), "1");
        // the mirrored form is deliberately not short circuited
        assert_eq!(simplify_condition(&map(""), "X || 1", false), "X || 1");
    }

    #[test]
    fn match_cfg_def_basics() {
        assert!(match_cfg_def(&map("A"), "A"));
        assert!(!match_cfg_def(&map("A"), "B"));
        assert!(match_cfg_def(&map(""), "1"));
        assert!(!match_cfg_def(&map(""), "0"));
    }
}
