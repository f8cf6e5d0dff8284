//! Small path helpers used by the include resolver. Paths are treated as
//! plain strings with `/` separators; nothing here touches the filesystem.

/// Normalise separators to `/` and resolve `.` and `..` components textually.
///
/// `..` pops a previous component when one is available and is kept verbatim
/// otherwise, so relative paths that escape their root stay relative.
#[must_use]
pub fn simplify_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');
    let trailing_slash = path.ends_with('/') && path.len() > 1;

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(&p) if p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }

    let mut out = String::new();
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    if trailing_slash && !out.ends_with('/') {
        out.push('/');
    }
    if out.is_empty() {
        out.push('.');
    }
    out
}

/// Convert a path to the separators native to the current platform.
#[must_use]
pub fn to_native_separators(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\")
    } else {
        path.replace('\\', "/")
    }
}

/// Key used to detect that the same file was included twice: simplified and
/// lower-cased, so case-insensitive filesystems do not defeat the check.
pub(crate) fn canonical_key(path: &str) -> String {
    simplify_path(path).to_lowercase()
}

/// The directory part of `path` including the trailing separator, or the
/// empty string when there is none.
pub(crate) fn directory_of(path: &str) -> String {
    match path.rfind(|c| c == '/' || c == '\\') {
        Some(pos) => path[..=pos].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simplify_removes_dot_components() {
        assert_eq!(simplify_path("a/./b"), "a/b");
        assert_eq!(simplify_path("./a/b"), "a/b");
    }

    #[test]
    fn simplify_resolves_parent_components() {
        assert_eq!(simplify_path("a/b/../c"), "a/c");
        assert_eq!(simplify_path("a/b/../../c"), "c");
        assert_eq!(simplify_path("../a"), "../a");
    }

    #[test]
    fn simplify_normalises_backslashes() {
        assert_eq!(simplify_path("a\\b\\c.h"), "a/b/c.h");
    }

    #[test]
    fn directory_part() {
        assert_eq!(directory_of("src/main.c"), "src/");
        assert_eq!(directory_of("main.c"), "");
        assert_eq!(directory_of("/abs/x.h"), "/abs/");
    }

    #[test]
    fn canonical_key_is_case_insensitive() {
        assert_eq!(canonical_key("Inc/../A.H"), canonical_key("a.h"));
    }
}
