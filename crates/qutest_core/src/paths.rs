//! Path helpers for discovery results and report output.
//!
//! Discovered paths are root-relative and always use `/` separators, so everything here works on plain strings.

/// Flatten a list of lists, preserving order.
///
/// ## Parameters
/// - `parts`: per-source result lists (for example, one list per include pattern).
///
/// ## Returns
/// - (`Vec<T>`): all elements, first list first.
pub fn merge<T>(parts: Vec<Vec<T>>) -> Vec<T> {
    let total = parts.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    for part in parts {
        merged.extend(part);
    }
    merged
}

/// Longest common byte prefix of all paths.
///
/// ## Returns
/// - (`&str`): a prefix of the lexicographically smallest path; empty when `paths` is empty.
///
/// ## Notes
/// - After sorting, the common prefix of the whole set equals the common prefix of the first and last element.
/// - The result may end in the middle of a path component; see [`display_prefix`].
pub fn longest_common_prefix<S: AsRef<str>>(paths: &[S]) -> &str {
    let Some(first) = paths.iter().map(AsRef::as_ref).min() else {
        return "";
    };
    let last = paths.iter().map(AsRef::as_ref).max().unwrap_or(first);

    let len = first
        .bytes()
        .zip(last.bytes())
        .take_while(|(a, b)| a == b)
        .count();
    let mut end = len;
    while !first.is_char_boundary(end) {
        end -= 1;
    }
    &first[..end]
}

/// The prefix stripped from every path in report lines.
///
/// This is the longest common prefix trimmed back to the nearest enclosing directory, including its trailing `/`.
/// A single discovered file therefore displays as its file name.
pub fn display_prefix<S: AsRef<str>>(paths: &[S]) -> String {
    let common = longest_common_prefix(paths);
    match common.rfind('/') {
        Some(idx) => common[..=idx].to_string(),
        None => String::new(),
    }
}

/// Remove the display prefix from a path, leaving it unchanged when it does not start with the prefix.
pub fn strip_display_prefix<'a>(path: &'a str, prefix: &str) -> &'a str {
    path.strip_prefix(prefix).unwrap_or(path)
}
