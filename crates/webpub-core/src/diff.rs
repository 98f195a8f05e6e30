use std::path::Path;

use similar::TextDiff;

/// Unified diff between two versions of a file, `None` when they are equal.
pub fn build_unified_diff(original: &str, modified: &str, path: &Path) -> Option<String> {
    if original == modified {
        return None;
    }

    let diff = TextDiff::from_lines(original, modified);
    let header_old = format!("a{}", rooted(path));
    let header_new = format!("b{}", rooted(path));

    Some(
        diff.unified_diff()
            .context_radius(3)
            .header(&header_old, &header_new)
            .to_string(),
    )
}

fn rooted(path: &Path) -> String {
    let display = path.display().to_string();
    if display.starts_with('/') {
        display
    } else {
        format!("/{display}")
    }
}
