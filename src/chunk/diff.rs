//! Content hashing and line diff rendering.
//!
//! The diff is a prefix/suffix heuristic rather than a minimal edit script:
//! everything between the longest common prefix and suffix is shown as removed
//! and then added. Chunks cover short, local edits, so this stays readable.

/// Lines of unchanged context shown around the changed region.
const CONTEXT_LINES: usize = 3;

/// Characters of each hash shown in the diff header.
const SHORT_HASH_LEN: usize = 8;

/// Compute the hex-encoded blake3 hash of file content.
#[must_use]
pub fn hash_content(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Render the diff between two versions of a file.
///
/// The header names `path` and the abbreviated hashes; the body is a single
/// hunk. Identical or empty inputs produce only the header.
#[must_use]
pub fn render_diff(
    path: &str,
    initial_hash: &str,
    final_hash: &str,
    initial: &[u8],
    latest: &[u8],
) -> String {
    let header = format!(
        "diff --git a/{path} b/{path}\nindex {}..{}\n--- a/{path}\n+++ b/{path}\n",
        short_hash(initial_hash),
        short_hash(final_hash),
    );

    let old_text = String::from_utf8_lossy(initial);
    let new_text = String::from_utf8_lossy(latest);
    let old_lines = split_lines(&old_text);
    let new_lines = split_lines(&new_text);

    header + &render_hunk(&old_lines, &new_lines)
}

fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}

/// Split on `\n`, keeping a trailing partial line and yielding nothing for empty text.
fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&str> = text.split('\n').collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

fn render_hunk(old_lines: &[&str], new_lines: &[&str]) -> String {
    if old_lines.is_empty() && new_lines.is_empty() {
        return String::new();
    }

    let prefix = old_lines
        .iter()
        .zip(new_lines)
        .take_while(|(a, b)| a == b)
        .count();

    let suffix = old_lines[prefix..]
        .iter()
        .rev()
        .zip(new_lines[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_end = old_lines.len() - suffix;
    let new_end = new_lines.len() - suffix;

    let mut out = Vec::with_capacity(old_lines.len() + new_lines.len() + 1);
    out.push(format!(
        "@@ -1,{} +1,{} @@",
        old_lines.len(),
        new_lines.len()
    ));

    let context_start = prefix.saturating_sub(CONTEXT_LINES);
    out.extend(old_lines[context_start..prefix].iter().map(|l| format!(" {l}")));
    out.extend(old_lines[prefix..old_end].iter().map(|l| format!("-{l}")));
    out.extend(new_lines[prefix..new_end].iter().map(|l| format!("+{l}")));

    let context_end = (old_end + CONTEXT_LINES).min(old_lines.len());
    out.extend(old_lines[old_end..context_end].iter().map(|l| format!(" {l}")));

    out.join("\n")
}
