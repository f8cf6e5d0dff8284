//! A deliberately small token list. Preprocessor conditions and macro
//! definitions are tokenised with it, and constant folding of fully numeric
//! subexpressions is the only arithmetic the preprocessor performs. It knows
//! nothing about the rest of the crate so the boundary to real syntax
//! analysis stays narrow.

/// Check if a character can start an identifier (letter or underscore)
pub(crate) const fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Check if a character can continue an identifier (letter, digit, or underscore)
pub(crate) const fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// True for identifier-shaped tokens.
pub(crate) fn is_name(tok: &str) -> bool {
    let mut chars = tok.chars();
    match chars.next() {
        Some(c) if is_identifier_start(c) => chars.all(is_identifier_continue),
        _ => false,
    }
}

/// True for number-shaped tokens.
pub(crate) fn is_number(tok: &str) -> bool {
    tok.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Split `code` into identifiers, numbers, literals and operators.
///
/// `##` stays one token, `#name` stays one token (needed for
/// stringification), and string/char literals are kept verbatim including
/// their quotes. Whitespace only separates tokens.
pub(crate) fn tokenize(code: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = code.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
        } else if is_identifier_start(c) {
            let start = i;
            while i < chars.len() && is_identifier_continue(chars[i]) {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else if c == '"' || c == '\'' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            if i < chars.len() {
                i += 1;
            }
            tokens.push(chars[start..i.min(chars.len())].iter().collect());
        } else if c == '#' {
            if chars.get(i + 1) == Some(&'#') {
                tokens.push("##".to_string());
                i += 2;
            } else if chars.get(i + 1).is_some_and(|&n| is_identifier_start(n)) {
                let start = i;
                i += 1;
                while i < chars.len() && is_identifier_continue(chars[i]) {
                    i += 1;
                }
                tokens.push(chars[start..i].iter().collect());
            } else {
                tokens.push("#".to_string());
                i += 1;
            }
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            match two.as_str() {
                "&&" | "||" | "==" | "!=" | "<=" | ">=" | "<<" | ">>" => {
                    tokens.push(two);
                    i += 2;
                }
                _ => {
                    tokens.push(c.to_string());
                    i += 1;
                }
            }
        }
    }
    tokens
}

fn parse_int(tok: &str) -> Option<i64> {
    let t = tok.trim_end_matches(|c| matches!(c, 'u' | 'U' | 'l' | 'L'));
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if t.len() > 1 && t.starts_with('0') && t.chars().all(|c| c.is_ascii_digit()) {
        i64::from_str_radix(t, 8).ok()
    } else {
        t.parse().ok()
    }
}

fn apply(op: &str, lhs: i64, rhs: i64) -> Option<i64> {
    Some(match op {
        "*" => lhs.checked_mul(rhs)?,
        "/" => lhs.checked_div(rhs)?,
        "%" => lhs.checked_rem(rhs)?,
        "+" => lhs.checked_add(rhs)?,
        "-" => lhs.checked_sub(rhs)?,
        "<<" => lhs.checked_shl(u32::try_from(rhs).ok()?)?,
        ">>" => lhs.checked_shr(u32::try_from(rhs).ok()?)?,
        "<" => i64::from(lhs < rhs),
        "<=" => i64::from(lhs <= rhs),
        ">" => i64::from(lhs > rhs),
        ">=" => i64::from(lhs >= rhs),
        "==" => i64::from(lhs == rhs),
        "!=" => i64::from(lhs != rhs),
        "&&" => i64::from(lhs != 0 && rhs != 0),
        "||" => i64::from(lhs != 0 || rhs != 0),
        _ => return None,
    })
}

// Binary operators grouped by precedence, strongest first. Each group is
// folded left to right before weaker groups are considered.
const PRECEDENCE: &[&[&str]] = &[
    &["*", "/", "%"],
    &["+", "-"],
    &["<<", ">>"],
    &["<", "<=", ">", ">="],
    &["==", "!="],
    &["&&"],
    &["||"],
];

/// Fold fully numeric subexpressions in place: `num op num` triples are
/// replaced by their value and redundant parentheses around a lone number are
/// dropped (except an opening parenthesis at the very start, which callers
/// pattern-match against). Returns true if anything changed.
pub(crate) fn simplify_calculations(tokens: &mut Vec<String>) -> bool {
    let mut modified = false;
    loop {
        let mut changed = false;

        // ( num ) -> num, but never for the leading parenthesis
        let mut i = 1;
        while i + 2 < tokens.len() {
            if tokens[i] == "(" && is_number(&tokens[i + 1]) && tokens[i + 2] == ")" {
                tokens.remove(i + 2);
                tokens.remove(i);
                changed = true;
            } else {
                i += 1;
            }
        }

        for group in PRECEDENCE {
            let mut i = 0;
            while i + 2 < tokens.len() {
                let foldable = group.contains(&tokens[i + 1].as_str())
                    && is_number(&tokens[i])
                    && is_number(&tokens[i + 2]);
                if foldable {
                    let folded = parse_int(&tokens[i])
                        .zip(parse_int(&tokens[i + 2]))
                        .and_then(|(l, r)| apply(&tokens[i + 1], l, r));
                    if let Some(value) = folded {
                        tokens.splice(i..i + 3, [value.to_string()]);
                        changed = true;
                        continue;
                    }
                }
                i += 1;
            }
            if changed {
                // refold stronger groups before the weaker ones
                break;
            }
        }

        if !changed {
            return modified;
        }
        modified = true;
    }
}
