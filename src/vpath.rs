//! Virtual asset paths: `[Root]/segment/segment`.
//!
//! `Root` is a bracketed token bound 1:1 to a filesystem directory at init
//! time (§6.3: `[Engine]`, `[Shaders]`, `[Game]` by convention, plus any
//! host-registered root). The remainder is a slash-separated path with no
//! file extension and no `.`/`..` segments.

/// True if `root` is exactly `[A-Za-z_][A-Za-z0-9_]*` wrapped in brackets.
pub fn is_valid_root_token(root: &str) -> bool {
    let Some(inner) = root.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        return false;
    };
    let mut chars = inner.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// True if `path` is `[Root]` followed by zero or more `/segment` parts,
/// none of which are empty, `.`, or `..`.
pub fn is_valid_virtual_path(path: &str) -> bool {
    let Some(end) = path.find(']') else {
        return false;
    };
    if !path.starts_with('[') {
        return false;
    }
    let root = &path[..=end];
    if !is_valid_root_token(root) {
        return false;
    }
    let rest = &path[end + 1..];
    if rest.is_empty() {
        return true;
    }
    if !rest.starts_with('/') {
        return false;
    }
    rest.split('/').skip(1).all(|seg| {
        !seg.is_empty() && seg != "." && seg != ".." && !seg.contains(':') && !seg.contains('\\')
    })
}

/// The bracketed root token, e.g. `root_of("[Shaders]/Lit") == "[Shaders]"`.
///
/// Panics if `path` does not start with `[`; callers are expected to have
/// validated with [`is_valid_virtual_path`] first, mirroring the contract
/// of the rest of this module (cheap, no-alloc accessors over an
/// already-canonicalized string).
pub fn root_of(path: &str) -> &str {
    let end = path.find(']').expect("virtual path missing root token");
    &path[..=end]
}

/// Everything after the root token, e.g. `rest_of("[Shaders]/Lit") == "/Lit"`.
pub fn rest_of(path: &str) -> &str {
    let end = path.find(']').expect("virtual path missing root token");
    &path[end + 1..]
}

/// The segments after the root, e.g. `["Materials", "Default"]` for
/// `"[Engine]/Materials/Default"`.
pub fn segments_of(path: &str) -> impl Iterator<Item = &str> {
    rest_of(path).split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_virtual_path_validity() {
        assert!(is_valid_virtual_path("[Engine]/Materials/Default"));
        assert!(!is_valid_virtual_path("[Engine]/../etc"));
        assert_eq!(root_of("[Shaders]/Lit"), "[Shaders]");
        assert_eq!(rest_of("[Shaders]/Lit"), "/Lit");
    }

    #[test]
    fn bare_root_with_no_segments_is_valid() {
        assert!(is_valid_virtual_path("[Engine]"));
        assert_eq!(rest_of("[Engine]"), "");
    }

    #[test]
    fn rejects_malformed_roots() {
        assert!(!is_valid_virtual_path("Engine]/Foo"));
        assert!(!is_valid_virtual_path("[1Engine]/Foo"));
        assert!(!is_valid_virtual_path("[]/Foo"));
    }

    #[test]
    fn rejects_empty_or_dotted_segments() {
        assert!(!is_valid_virtual_path("[Engine]//Foo"));
        assert!(!is_valid_virtual_path("[Engine]/./Foo"));
        assert!(!is_valid_virtual_path("[Engine]/Foo/.."));
    }

    #[test]
    fn segments_of_splits_on_slash() {
        let segs: Vec<_> = segments_of("[Engine]/Materials/Default").collect();
        assert_eq!(segs, vec!["Materials", "Default"]);
    }
}
