//! Filename sanitization for titles and site names.

/// Longest sanitized stem. Leaves room for the `_<md5>.tmp.mp4` and
/// `_<n>.mp4` suffixes within Linux NAME_MAX (255 bytes).
const STEM_MAX: usize = 200;

/// Stem used when nothing printable survives sanitization.
const FALLBACK_STEM: &str = "untitled";

/// Sanitizes a title (or site name) for use as a file or directory stem.
///
/// - Replaces `< > : " / \ | ? *`, NUL and control characters with `_`
/// - Collapses consecutive underscores
/// - Trims leading/trailing spaces and dots
/// - Limits length to 200 bytes on a char boundary
/// - Falls back to `untitled` when the result is empty
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let illegal = matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
            || c == '\0'
            || c.is_control();
        let replacement = if illegal { '_' } else { c };

        if replacement == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(replacement);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.');
    let mut take = trimmed.len().min(STEM_MAX);
    while take > 0 && !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    let stem = trimmed[..take].trim_end_matches(|c| c == ' ' || c == '.');

    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    }
}
