//! Path-tree segment handling shared by the master client and every
//! coordination primitive built on top of it. Paths are always
//! slash-delimited and never carry a leading or trailing slash once
//! normalized.

/// Joins a root prefix and a relative path into one normalized path.
pub fn join(root: &str, path: &str) -> String {
    let root = root.trim_matches('/');
    let path = path.trim_matches('/');
    if root.is_empty() {
        path.to_string()
    } else if path.is_empty() {
        root.to_string()
    } else {
        format!("{root}/{path}")
    }
}

/// Splits a path into its slash-delimited segments, discarding empty
/// segments produced by leading/trailing/doubled slashes.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Every nonempty prefix of `path`, shortest first: `"a/b/c"` yields
/// `["a", "a/b", "a/b/c"]`. Used to fan an event on a path out to every
/// watcher registered on one of its ancestors.
pub fn prefixes(path: &str) -> Vec<String> {
    let segs = segments(path);
    let mut out = Vec::with_capacity(segs.len());
    let mut current = String::new();
    for seg in segs {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(seg);
        out.push(current.clone());
    }
    out
}

/// The parent path, or `None` if `path` is already a root segment.
pub fn parent(path: &str) -> Option<String> {
    let segs = segments(path);
    if segs.len() <= 1 {
        None
    } else {
        Some(segs[..segs.len() - 1].join("/"))
    }
}

/// The final segment of a path, e.g. `"a/b/c" -> "c"`.
pub fn basename(path: &str) -> &str {
    segments(path).last().copied().unwrap_or("")
}

/// Parses the decimal sequence number out of a generated child name of
/// the form `_<integer>`.
pub fn sequence_number(generated_name: &str) -> Option<u64> {
    generated_name.strip_prefix('_')?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_trims_and_combines() {
        assert_eq!(join("/root/", "/a/b"), "root/a/b");
        assert_eq!(join("root", ""), "root");
        assert_eq!(join("", "a"), "a");
    }

    #[test]
    fn prefixes_are_cumulative() {
        assert_eq!(prefixes("a/b/c"), vec!["a", "a/b", "a/b/c"]);
        assert_eq!(prefixes(""), Vec::<String>::new());
    }

    #[test]
    fn sequence_number_parses_the_suffix() {
        assert_eq!(sequence_number("_0000000042"), Some(42));
        assert_eq!(sequence_number("not_a_seq"), None);
    }
}
