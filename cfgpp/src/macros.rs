//! Macro table and expansion. Works on the selected text of one
//! configuration: `#define`/`#undef` maintain the table, `#file`/`#endfile`
//! move the location cursor, everything else gets its macro uses expanded in
//! place. Expansion is guarded per macro by a suffix-length anchor so that a
//! macro appearing in its own expansion can never loop, while calls carried
//! in via arguments still expand.

use std::collections::HashMap;

use crate::error::{write_error, ErrorSink};
use crate::token;

/// Skip a string or char literal. `pos` enters at the opening quote and
/// leaves at the closing quote, or at the end of `line` when unterminated.
fn skip_string(line: &str, pos: &mut usize) {
    let b = line.as_bytes();
    let quote = b[*pos];
    *pos += 1;
    while *pos < line.len() && b[*pos] != quote {
        if b[*pos] == b'\\' {
            *pos += 1;
        }
        *pos += 1;
    }
}

/// Read a parenthesised argument list starting at `pos` (which may sit on one
/// leading space). Respects nested parentheses and literals; newlines inside
/// the call are counted, not copied. `pos` ends up on the closing
/// parenthesis when `end_found` is true.
fn get_params(line: &str, pos: &mut usize) -> (Vec<String>, usize, bool) {
    let b = line.as_bytes();
    let mut params: Vec<String> = Vec::new();
    let mut newlines = 0usize;

    if b.get(*pos) == Some(&b' ') {
        *pos += 1;
    }
    if b.get(*pos) != Some(&b'(') {
        return (params, newlines, false);
    }

    let mut parlevel = 0i32;
    let mut par: Vec<u8> = Vec::new();

    while *pos < line.len() {
        let ch = b[*pos];

        if ch == b'(' {
            parlevel += 1;
            if parlevel == 1 {
                *pos += 1;
                continue;
            }
        } else if ch == b')' {
            parlevel -= 1;
            if parlevel <= 0 {
                params.push(String::from_utf8_lossy(&par).into_owned());
                return (params, newlines, true);
            }
        } else if ch == b'"' || ch == b'\'' {
            let start = *pos;
            skip_string(line, pos);
            if *pos == line.len() {
                break;
            }
            par.extend_from_slice(&b[start..=*pos]);
            *pos += 1;
            continue;
        } else if ch == b'\n' {
            newlines += 1;
            *pos += 1;
            continue;
        }

        if parlevel == 1 && ch == b',' {
            params.push(String::from_utf8_lossy(&par).into_owned());
            par.clear();
        } else if ch == b' ' {
            // spaces are only kept when gluing two words together
            if par.last().is_some_and(u8::is_ascii_alphanumeric) {
                par.push(b' ');
            }
        } else if parlevel >= 1 {
            par.push(ch);
        }
        *pos += 1;
    }

    (params, newlines, false)
}

/// One `#define`: the raw definition text plus its parsed shape.
#[derive(Clone, Debug)]
pub(crate) struct MacroDef {
    /// tokenised definition, used for parameter substitution
    tokens: Vec<String>,
    /// parameter names; for `...` the synthetic name `__VA_ARGS__`
    params: Vec<String>,
    name: String,
    /// definition text as written, after `#define `
    text: String,
    variadic: bool,
    /// `NAME()` with an empty parameter list
    nopar: bool,
}

impl MacroDef {
    /// Parse the text after `#define`, e.g. `A(x) foo(x);`.
    pub(crate) fn new(text: &str) -> Self {
        let tokens = token::tokenize(text);
        let name = match tokens.first() {
            Some(t) if token::is_name(t) => t.clone(),
            _ => String::new(),
        };

        let mut params: Vec<String> = Vec::new();
        let mut variadic = false;
        let mut nopar = false;

        let paren_first = text
            .find(|c| c == ' ' || c == '(')
            .is_some_and(|p| text.as_bytes()[p] == b'(');
        if paren_first {
            let dots_at = |i: usize| {
                tokens.get(i).map(String::as_str) == Some(".")
                    && tokens.get(i + 1).map(String::as_str) == Some(".")
                    && tokens.get(i + 2).map(String::as_str) == Some(".")
                    && tokens.get(i + 3).map(String::as_str) == Some(")")
            };

            if tokens.len() >= 3
                && token::is_name(&tokens[0])
                && tokens[1] == "("
                && token::is_name(&tokens[2])
            {
                let mut i = 2;
                while i < tokens.len() {
                    if tokens[i] == ")" {
                        break;
                    }
                    if dots_at(i) {
                        variadic = true;
                        // `name...` collects the tail itself; a bare `...`
                        // is addressed as __VA_ARGS__
                        if !token::is_name(&tokens[i - 1]) {
                            params.push("__VA_ARGS__".to_string());
                        }
                        break;
                    }
                    if token::is_name(&tokens[i]) {
                        params.push(tokens[i].clone());
                    }
                    i += 1;
                }
            } else if tokens.len() >= 2 && token::is_name(&tokens[0]) && tokens[1] == "(" && dots_at(2)
            {
                variadic = true;
            } else if tokens.len() >= 3
                && token::is_name(&tokens[0])
                && tokens[1] == "("
                && tokens[2] == ")"
            {
                nopar = true;
            }
        }

        MacroDef {
            tokens,
            params,
            name,
            text: text.to_string(),
            variadic,
            nopar,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn takes_arguments(&self) -> bool {
        self.variadic || self.nopar || !self.params.is_empty()
    }

    /// When the body is exactly `INNER(p1,..,pN)` with the same arity as this
    /// macro, arguments of the shape `INNER(a1,..,aN)` are expanded before
    /// substitution. `INNER` is removed from the table for the nested
    /// expansion so the two cannot recurse through each other.
    fn expand_inner_macros(
        &self,
        params1: &[String],
        macros: &HashMap<String, MacroDef>,
    ) -> Vec<String> {
        let Some(rp) = self.tokens.iter().position(|t| t == ")") else {
            return params1.to_vec();
        };
        let inner_name = match (self.tokens.get(rp + 1), self.tokens.get(rp + 2)) {
            (Some(name), Some(paren)) if token::is_name(name) && paren == "(" => name.clone(),
            _ => return params1.to_vec(),
        };

        let mut i = rp + 3;
        let mut par = 0usize;
        loop {
            let name_ok = self.tokens.get(i).is_some_and(|t| token::is_name(t));
            let sep_ok = self
                .tokens
                .get(i + 1)
                .is_some_and(|t| t == "," || t == ")");
            if name_ok && sep_ok {
                i += 2;
                par += 1;
            } else {
                break;
            }
        }
        if i < self.tokens.len() || par != params1.len() {
            return params1.to_vec();
        }

        let mut params2 = params1.to_vec();
        let call_prefix = format!("{}(", inner_name);
        for (ipar, param) in params1.iter().enumerate() {
            if !param.starts_with(&call_prefix) || !param.ends_with(')') {
                continue;
            }
            let mut pos = call_prefix.len() - 1;
            let (innerparams, num, end_found) = get_params(param, &mut pos);
            let whole_argument = pos == param.len() - 1 && num == 0 && end_found;
            if whole_argument && innerparams.len() == params1.len() {
                if let Some(inner_macro) = macros.get(&inner_name) {
                    let mut inner_macros = macros.clone();
                    inner_macros.remove(&inner_name);
                    let mut innercode = String::new();
                    let _ = inner_macro.code(&innerparams, &inner_macros, &mut innercode);
                    params2[ipar] = innercode;
                }
            }
        }
        params2
    }

    /// Produce the expansion of this macro for the given arguments into
    /// `macrocode`. Returns false when the call provides too few arguments.
    pub(crate) fn code(
        &self,
        given: &[String],
        macros: &HashMap<String, MacroDef>,
        macrocode: &mut String,
    ) -> bool {
        if self.nopar || (self.params.is_empty() && self.variadic) {
            let mut body = match self.text.find(')') {
                Some(p) => self.text[p + 1..].to_string(),
                None => String::new(),
            };
            body = body.trim_start_matches(' ').to_string();
            if let Some(nl) = body.find(['\r', '\n']) {
                body.truncate(nl);
            }
            if !self.nopar {
                body = body.replace("__VA_ARGS__", &given.join(","));
            }
            *macrocode = body;
        } else if self.params.is_empty() {
            // object-like: everything after the first space
            match self.text.find(' ') {
                None => macrocode.clear(),
                Some(p) => {
                    let mut body = self.text[p + 1..].to_string();
                    if let Some(nl) = body.find(['\r', '\n']) {
                        body.truncate(nl);
                    }
                    *macrocode = body;
                }
            }
        } else {
            let givenparams = self.expand_inner_macros(given, macros);

            let Some(rp) = self.tokens.iter().position(|t| t == ")") else {
                return true;
            };
            let mut optcomma = false;
            let mut ti = rp + 1;
            while ti < self.tokens.len() {
                let tok = &self.tokens[ti];
                let mut piece = tok.clone();

                if piece == "##" {
                    ti += 1;
                    continue;
                }

                if piece.starts_with('#') || token::is_name(&piece) {
                    let stringify = piece.starts_with('#');
                    if stringify {
                        piece.remove(0);
                    }
                    for i in 0..self.params.len() {
                        if piece != self.params[i] {
                            continue;
                        }
                        let collects_tail = self.variadic
                            && (i == self.params.len() - 1
                                || (given.len() + 2 == self.params.len()
                                    && i + 1 == self.params.len() - 1));
                        if collects_tail {
                            piece = String::new();
                            for j in (self.params.len() - 1)..givenparams.len() {
                                if optcomma || j > self.params.len() - 1 {
                                    piece.push(',');
                                }
                                optcomma = false;
                                piece.push_str(&givenparams[j]);
                            }
                        } else if i >= givenparams.len() {
                            // the call used fewer parameters than the macro has
                            macrocode.clear();
                            return false;
                        } else if stringify {
                            let arg = &givenparams[i];
                            let mut quoted = String::with_capacity(arg.len() + 2);
                            quoted.push('"');
                            for c in arg.chars() {
                                if c == '\\' || c == '"' {
                                    quoted.push('\\');
                                }
                                quoted.push(c);
                            }
                            quoted.push('"');
                            piece = quoted;
                        } else {
                            piece = givenparams[i].clone();
                        }
                        break;
                    }
                }

                if self.variadic
                    && tok == ","
                    && self.tokens.get(ti + 1).map(String::as_str) == Some("##")
                {
                    optcomma = true;
                    ti += 1;
                    continue;
                }
                optcomma = false;
                macrocode.push_str(&piece);

                // keep tokens apart that would otherwise merge
                if let Some(next) = self.tokens.get(ti + 1) {
                    let name_name = token::is_name(tok) && token::is_name(next);
                    let name_num = token::is_name(tok) && token::is_number(next);
                    let num_name = token::is_number(tok) && token::is_name(next);
                    let shift = tok == ">" && next == ">";
                    if name_name || name_num || num_name || shift {
                        macrocode.push(' ');
                    }
                }
                ti += 1;
            }
        }
        true
    }
}

// Statement-aware line reader: newlines inside parentheses or literals do
// not end a logical line, a directive ends at its newline, and ordinary code
// ends at `;` (outside parentheses) or right before a line that starts a
// directive.
fn getlines(b: &[u8], pos: &mut usize, line: &mut Vec<u8>) -> bool {
    if *pos >= b.len() {
        return false;
    }
    line.clear();
    let mut parlevel = 0i32;
    while *pos < b.len() {
        let ch = b[*pos];
        *pos += 1;

        if ch == b'\'' || ch == b'"' {
            line.push(ch);
            let mut c = 0u8;
            while c != ch {
                if c == b'\\' {
                    if *pos >= b.len() {
                        return true;
                    }
                    c = b[*pos];
                    *pos += 1;
                    line.push(c);
                }
                if *pos >= b.len() {
                    return true;
                }
                c = b[*pos];
                *pos += 1;
                if c == b'\n' && line.first() == Some(&b'#') {
                    return true;
                }
                line.push(c);
            }
            continue;
        }

        if ch == b'(' {
            parlevel += 1;
        } else if ch == b')' {
            parlevel -= 1;
        } else if ch == b'\n' {
            if line.first() == Some(&b'#') {
                return true;
            }
            if b.get(*pos) == Some(&b'#') {
                line.push(ch);
                return true;
            }
        } else if line.first() != Some(&b'#') && parlevel <= 0 && ch == b';' {
            line.push(b';');
            return true;
        }

        line.push(ch);
    }
    true
}

/// Expand all macro uses in the selected text of one configuration. On a
/// fatal problem (unterminated literal, call with too few arguments) an error
/// is reported and the empty string returned.
pub(crate) fn expand_macros(code: &str, filename: &str, sink: &mut dyn ErrorSink) -> String {
    let mut macros: HashMap<String, MacroDef> = HashMap::new();

    let mut filename = filename.to_string();
    let mut linenr: usize = 1;

    // (line, file) to return to at #endfile
    let mut fileinfo: Vec<(usize, String)> = Vec::new();

    let mut ostr = String::with_capacity(code.len());

    let bytes = code.as_bytes();
    let mut read_pos = 0usize;
    let mut raw_line: Vec<u8> = Vec::new();
    while getlines(bytes, &mut read_pos, &mut raw_line) {
        let mut line = String::from_utf8_lossy(&raw_line).into_owned();

        if line.starts_with("#define ") {
            let mac = MacroDef::new(&line[8..]);
            if !mac.name().is_empty() {
                macros.insert(mac.name().to_string(), mac);
            }
            line = "\n".to_string();
        } else if line.starts_with("#undef ") {
            macros.remove(&line[7..]);
            line = "\n".to_string();
        } else if line.starts_with("#file \"") {
            fileinfo.push((linenr, filename.clone()));
            let end = line.len().saturating_sub(1).max(7);
            filename = line.get(7..end).unwrap_or_default().to_string();
            linenr = 0;
            line.push('\n');
        } else if line == "#endfile" {
            if let Some((return_line, return_file)) = fileinfo.pop() {
                linenr = return_line;
                filename = return_file;
            }
            line.push('\n');
        } else if line.starts_with('#') {
            line.push('\n');
        } else if !expand_line(&mut line, &macros, &filename, linenr, sink) {
            return String::new();
        }

        ostr.push_str(&line);
        linenr += line.matches('\n').count();
    }

    ostr
}

// Expand every macro use in one logical line. Returns false on a fatal
// error, which has already been reported.
fn expand_line(
    line: &mut String,
    macros: &HashMap<String, MacroDef>,
    filename: &str,
    linenr: usize,
    sink: &mut dyn ErrorSink,
) -> bool {
    // Limit for each macro: the smallest remaining-suffix length at which it
    // was last expanded. A macro may only expand again strictly to the right
    // of its previous expansion start. The anchor is measured from the end of
    // the line, so edits left of it do not invalidate it.
    let mut limits: HashMap<String, usize> = HashMap::new();

    let mut pos = 0usize;
    let mut tmp_linenr = 0usize;
    while pos < line.len() {
        let ch = line.as_bytes()[pos];
        if ch == b'\n' {
            tmp_linenr += 1;
        }

        if ch == b'"' || ch == b'\'' {
            skip_string(line, &mut pos);
            pos += 1;
            if pos >= line.len() {
                write_error(
                    sink,
                    filename,
                    linenr + tmp_linenr,
                    "noQuoteCharPair",
                    &format!(
                        "No pair for character ({}). Can't process file. \
                         File is either invalid or unicode, which is currently not supported.",
                        ch as char
                    ),
                );
                return false;
            }
            continue;
        }

        let is_ident_start =
            |c: u8| c.is_ascii_alphabetic() || c == b'_';
        if !is_ident_start(ch) {
            pos += 1;
        }

        // the loop rescans the inserted expansion, so a macro call produced
        // by an expansion is expanded as well
        while pos < line.len() && is_ident_start(line.as_bytes()[pos]) {
            let pos1 = pos;
            pos += 1;
            while pos < line.len() && {
                let c = line.as_bytes()[pos];
                c.is_ascii_alphanumeric() || c == b'_'
            } {
                pos += 1;
            }
            let id = line[pos1..pos].to_string();

            let Some(mac) = macros.get(&id) else {
                break;
            };

            if let Some(&limit) = limits.get(&id) {
                if line.len() - pos1 >= limit {
                    break;
                }
            }

            let mut pos2 = pos;
            if !mac.params.is_empty() && pos2 >= line.len() {
                break;
            }

            let mut params: Vec<String> = Vec::new();
            let mut number_of_newlines = 0usize;
            if mac.takes_arguments() {
                let (p, n, end_found) = get_params(line, &mut pos2);
                params = p;
                number_of_newlines = n;
                if !end_found {
                    break;
                }
            }

            // a single empty argument means no arguments at all
            if params.len() == 1 && params[0].is_empty() {
                params.clear();
            }

            if !mac.variadic && params.len() != mac.params.len() {
                break;
            }

            let mut temp_macro = String::new();
            if !mac.code(&params, macros, &mut temp_macro) {
                write_error(
                    sink,
                    filename,
                    linenr + tmp_linenr,
                    "syntaxError",
                    &format!("Syntax error. Not enough parameters for macro '{}'.", id),
                );
                return false;
            }

            // the expansion must span the same number of physical lines as
            // the call it replaces
            let mut macrocode = format!("{}{}", "\n".repeat(number_of_newlines), temp_macro);

            if mac.takes_arguments() {
                pos2 += 1;
            }

            let old_limit = limits.get(&id).copied();
            let len_before = line.len();
            limits.retain(|_, l| *l <= len_before - pos1);

            line.replace_range(pos1..pos2, "");

            // don't glue the expansion onto an identifier or number after it
            if line.as_bytes().get(pos1).is_some_and(|&c| c.is_ascii_alphanumeric() || c == b'_') {
                macrocode.push(' ');
            }
            line.insert_str(pos1, &macrocode);

            let mut new_limit = line.len().saturating_sub(pos1 + 1);
            if let Some(old) = old_limit {
                new_limit = new_limit.min(old);
            }
            limits.insert(id, new_limit);

            pos = pos1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingSink;

    fn expand(code: &str) -> String {
        let mut sink = CollectingSink::new();
        expand_macros(code, "test.c", &mut sink)
    }

    #[test]
    fn object_macro() {
        assert_eq!(expand("#define AAA 1\nx = AAA;\n"), "\nx = 1;\n");
    }

    #[test]
    fn function_macro() {
        assert_eq!(
            expand("#define ADD(a,b) ((a)+(b))\nint x = ADD(1,2);\n"),
            "\nint x = ((1)+(2));\n"
        );
    }

    #[test]
    fn nested_call_of_same_macro() {
        assert_eq!(
            expand("#define ADD(a,b) ((a)+(b))\nint x = ADD(1, ADD(2,3));\n"),
            "\nint x = ((1)+(((2)+(3))));\n"
        );
    }

    #[test]
    fn self_referential_macro_terminates() {
        assert_eq!(expand("#define A A\nx = A;\n"), "\nx = A;\n");
        assert_eq!(expand("#define A B\n#define B A\nx = A;\n"), "\n\nx = A;\n");
    }

    #[test]
    fn macro_producing_macro_call() {
        assert_eq!(
            expand("#define CALL f()\n#define f() 7\nx = CALL;\n"),
            "\n\nx = 7;\n"
        );
    }

    #[test]
    fn stringification() {
        assert_eq!(
            expand("#define STR(x) #x\nputs(STR(hello world));\n"),
            "\nputs(\"hello world\");\n"
        );
    }

    #[test]
    fn stringification_escapes() {
        assert_eq!(
            expand("#define STR(x) #x\ns = STR(back\\slash);\n"),
            "\ns = \"back\\\\slash\";\n"
        );
    }

    #[test]
    fn token_pasting_marker_is_dropped() {
        assert_eq!(
            expand("#define PASTE(a,b) a##b\nint PASTE(x,1) = 2;\n"),
            "\nint x1 = 2;\n"
        );
    }

    #[test]
    fn variadic_with_va_args() {
        assert_eq!(
            expand("#define LOG(fmt, ...) printf(fmt, ##__VA_ARGS__)\nLOG(\"hi\");\n"),
            "\nprintf(\"hi\");\n"
        );
        assert_eq!(
            expand("#define LOG(fmt, ...) printf(fmt, ##__VA_ARGS__)\nLOG(\"%d\", 1, 2);\n"),
            "\nprintf(\"%d\",1,2);\n"
        );
    }

    #[test]
    fn gcc_named_variadic() {
        assert_eq!(
            expand("#define DBG(fmt, args...) printf(fmt, ## args)\nDBG(\"hello\");\n"),
            "\nprintf(\"hello\");\n"
        );
    }

    #[test]
    fn pure_variadic() {
        assert_eq!(
            expand("#define DBG(...) printf(__VA_ARGS__)\nDBG(\"%d\", 1);\n"),
            "\nprintf(\"%d\",1);\n"
        );
    }

    #[test]
    fn nopar_macro() {
        assert_eq!(expand("#define AAA() 3\nx = AAA();\n"), "\nx = 3;\n");
    }

    #[test]
    fn undef_removes_macro() {
        assert_eq!(
            expand("#define AAA 1\n#undef AAA\nx = AAA;\n"),
            "\n\nx = AAA;\n"
        );
    }

    #[test]
    fn redefinition_wins() {
        assert_eq!(
            expand("#define AAA 1\n#define AAA 2\nx = AAA;\n"),
            "\n\nx = 2;\n"
        );
    }

    #[test]
    fn call_split_over_lines_is_one_statement() {
        assert_eq!(
            expand("#define ADD(a,b) ((a)+(b))\nint x = ADD(1,\n2);\n"),
            "\nint x = \n((1)+(2));\n"
        );
    }

    #[test]
    fn too_few_arguments_is_fatal() {
        let mut sink = CollectingSink::new();
        let out = expand_macros("#define M(a,b,c,...) c\nM(1);\n", "test.c", &mut sink);
        assert_eq!(out, "");
        assert!(sink.contains_id("syntaxError"));
    }

    #[test]
    fn wrong_argument_count_leaves_call_alone() {
        let mut sink = CollectingSink::new();
        let out = expand_macros("#define ADD(a,b) a+b\nx=ADD(1,2,3);\n", "test.c", &mut sink);
        assert_eq!(out, "\nx=ADD(1,2,3);\n");
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let mut sink = CollectingSink::new();
        let out = expand_macros("x = \"abc\n", "test.c", &mut sink);
        assert_eq!(out, "");
        assert!(sink.contains_id("noQuoteCharPair"));
    }

    #[test]
    fn file_sentinels_update_location() {
        let mut sink = CollectingSink::new();
        let code = "#file \"inc.h\"\nx = \"unterminated\n#endfile\n";
        let out = expand_macros(code, "test.c", &mut sink);
        assert_eq!(out, "");
        assert_eq!(sink.diagnostics[0].file, "inc.h");
    }

    #[test]
    fn newline_count_is_preserved_by_multiline_call() {
        let out = expand("#define M(a) a\nint x = M(\n\n1);\ny;\n");
        assert_eq!(out.matches('\n').count(), 5);
    }

    #[test]
    fn inner_macro_same_arity() {
        assert_eq!(
            expand("#define A(x) B(x)\n#define B(x) (x)\ny = A(B(1));\n"),
            "\n\ny = ((1));\n"
        );
    }
}
