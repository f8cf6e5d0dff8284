//! Line-oriented rewrites of `#if`/`#elif` conditions into the canonical
//! shapes the later passes pattern-match against. All rewrites here are
//! purely textual; directive keywords are only recognised left-aligned on a
//! line that already went through the reader.

// Same line iteration as reading with getline: the trailing newline does not
// produce an empty final line, and output lines always end in '\n'.
pub(crate) fn lines_of(code: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = code.split('\n').collect();
    if code.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// Strip redundant parentheses from `#if`/`#elif` conditions:
/// spaces next to parentheses go away, `((..))` collapses, and a condition
/// wrapped entirely in one pair of parentheses loses it.
pub(crate) fn remove_parentheses(code: &str) -> String {
    if !code.contains("\n#if") && !code.starts_with("#if") {
        return code.to_string();
    }

    let mut ret = String::with_capacity(code.len());
    for line in lines_of(code) {
        let mut line = line.to_string();
        if line.starts_with("#if") || line.starts_with("#elif") {
            while let Some(pos) = line.find(" (") {
                line.remove(pos);
            }
            while let Some(pos) = line.find("( ") {
                line.remove(pos + 1);
            }
            while let Some(pos) = line.find(" )") {
                line.remove(pos);
            }
            while let Some(pos) = line.find(") ") {
                line.remove(pos + 1);
            }

            // inner "((..))" -> "(..)"
            let mut pos = 0;
            while let Some(rel) = line[pos..].find("((") {
                pos += rel + 1;
                let inner = line[pos + 1..].find(|c| c == '(' || c == ')');
                if let Some(rel2) = inner {
                    let pos2 = pos + 1 + rel2;
                    if line.as_bytes()[pos2] == b')' {
                        line.remove(pos2);
                        line.remove(pos);
                    }
                }
            }

            // "#if(A)" -> "#if A", but only when the parentheses wrap the
            // whole condition
            if (line.starts_with("#if(") || line.starts_with("#elif(")) && line.ends_with(')') {
                let mut ind = 0;
                let bytes: Vec<u8> = line.bytes().collect();
                for (i, &b) in bytes.iter().enumerate() {
                    if b == b'(' {
                        ind += 1;
                    } else if b == b')' {
                        ind -= 1;
                        if ind == 0 {
                            if i == bytes.len() - 1 {
                                if let Some(open) = line.find('(') {
                                    line.replace_range(open..=open, " ");
                                }
                                line.pop();
                            }
                            break;
                        }
                    }
                }
            }

            if line.starts_with("#if(") {
                line.insert(3, ' ');
            } else if line.starts_with("#elif(") {
                line.insert(5, ' ');
            }
        }
        ret.push_str(&line);
        ret.push('\n');
    }
    ret
}

/// Rewrite `defined NAME` into `defined(NAME)` on `#if`/`#elif` lines. The
/// name ends at the first space, `|` or `&`.
pub(crate) fn parenthesize_defined(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for line in lines_of(code) {
        let mut line = line.to_string();
        if line.starts_with("#if ") || line.starts_with("#elif ") {
            while let Some(pos) = line.find(" defined ") {
                line.replace_range(pos + 8..pos + 9, "(");
                match line[pos + 8..].find(|c| c == ' ' || c == '|' || c == '&') {
                    Some(rel) => line.insert(pos + 8 + rel, ')'),
                    None => line.push(')'),
                }
            }
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Rewrite whole-line `#if defined(X)` / `#if !defined(X)` / `#elif
/// defined(X)` into `#ifdef X` / `#ifndef X` / `#elif X`.
pub(crate) fn replace_if_defined(code: &str) -> String {
    let mut ret = code.to_string();

    let mut pos = 0;
    while let Some(rel) = ret[pos..].find("#if defined(") {
        pos += rel;
        match ret[pos + 9..].find(')') {
            None => break,
            Some(rel2) => {
                let pos2 = pos + 9 + rel2;
                if ret.as_bytes().get(pos2 + 1) == Some(&b'\n') {
                    ret.remove(pos2);
                    ret.replace_range(pos + 3..pos + 12, "");
                    ret.insert_str(pos + 3, "def ");
                }
            }
        }
        pos += 1;
    }

    pos = 0;
    while let Some(rel) = ret[pos..].find("#if !defined(") {
        pos += rel;
        match ret[pos + 9..].find(')') {
            None => break,
            Some(rel2) => {
                let pos2 = pos + 9 + rel2;
                if ret.as_bytes().get(pos2 + 1) == Some(&b'\n') {
                    ret.remove(pos2);
                    ret.replace_range(pos + 3..pos + 13, "");
                    ret.insert_str(pos + 3, "ndef ");
                }
            }
        }
        pos += 1;
    }

    pos = 0;
    while let Some(rel) = ret[pos..].find("#elif defined(") {
        pos += rel;
        match ret[pos + 9..].find(')') {
            None => break,
            Some(rel2) => {
                let pos2 = pos + 9 + rel2;
                if ret.as_bytes().get(pos2 + 1) == Some(&b'\n') {
                    ret.remove(pos2);
                    ret.replace_range(pos + 6..pos + 14, "");
                }
            }
        }
        pos += 1;
    }

    ret
}

fn erase_asm_body(code: &mut String, pos: usize) {
    let bytes = code.as_bytes();
    let mut newlines = 0usize;
    let mut instr = false;
    let mut parlevel = 0i32;
    let mut pos2 = pos + 1;
    while pos2 < bytes.len() {
        let c = bytes[pos2];
        if c == b'"' {
            instr = !instr;
        } else if c == b'\n' {
            newlines += 1;
        } else if !instr {
            if c == b'(' {
                parlevel += 1;
            } else if c == b')' {
                if parlevel <= 1 {
                    break;
                }
                parlevel -= 1;
            }
        }
        pos2 += 1;
    }
    let end = (pos2 + 1).min(code.len());
    code.replace_range(pos + 1..end, "");
    code.insert_str(pos, &"\n".repeat(newlines));
}

/// Blank `asm(...)` statements (and their `__volatile` spellings), padding
/// with newlines so the line count does not change. A plain `asm(...)` keeps
/// an empty `asm()` marker behind.
pub(crate) fn remove_asm(code: &mut String) {
    for pattern in ["\nasm(", "\nasm ("] {
        let mut pos = 0;
        while let Some(rel) = code[pos..].find(pattern) {
            let found = pos + rel;
            erase_asm_body(code, found);
            pos = found + 1;
            code.insert_str(pos, "asm()");
        }
    }

    for pattern in ["\nasm __volatile(", "\nasm __volatile ("] {
        let mut pos = 0;
        while let Some(rel) = code[pos..].find(pattern) {
            let found = pos + rel;
            erase_asm_body(code, found);
            pos = found;
        }
    }
}
