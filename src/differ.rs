//! Unified line diffs between live and candidate configuration text.

use similar::TextDiff;

/// Unchanged lines shown around each change.
pub const CONTEXT_LINES: usize = 3;

/// Label for the live side of a diff against `host`.
#[must_use]
pub fn live_label(host: &str) -> String {
    format!("Current RTX830 Config ({host})")
}

/// Label for the candidate side of a diff against the file `name`.
#[must_use]
pub fn candidate_label(name: &str) -> String {
    format!("File Config ({name})")
}

/// Renders a unified diff from `live` to `candidate`.
///
/// Identical inputs produce an empty string; otherwise the output carries
/// `---`/`+++` headers using the supplied labels followed by `@@` hunks.
///
/// # Examples
///
/// ```
/// use rtxconfig::unified_diff;
///
/// assert!(unified_diff("save\n", "save\n", "live", "file").is_empty());
/// let diff = unified_diff("a\n", "b\n", "live", "file");
/// assert!(diff.starts_with("--- live\n+++ file\n@@"));
/// ```
#[must_use]
pub fn unified_diff(live: &str, candidate: &str, live_label: &str, candidate_label: &str) -> String {
    if live == candidate {
        return String::new();
    }
    TextDiff::from_lines(live, candidate)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(live_label, candidate_label)
        .to_string()
}
