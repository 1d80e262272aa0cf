use std::borrow::Cow;

/// Returns true for characters that may not appear in an XML 1.0 document.
///
/// Tab, newline and carriage return are allowed. Everything else below
/// 0x20 is not, and neither are DEL or the two noncharacters U+FFFE/U+FFFF.
fn is_forbidden(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{7f}' | '\u{fffe}' | '\u{ffff}')
}

/// Strips control characters that would make a rendered feed ill-formed.
///
/// Scraped pages occasionally carry stray NUL or form-feed bytes in titles
/// and descriptions; quick-xml writes them through unescaped, which breaks
/// every downstream parser.
///
/// Returns `Cow::Borrowed` when the input is already clean (common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_forbidden) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_forbidden(c)).collect())
}

/// Normalizes a scraped text node for use as a feed field.
///
/// Removes forbidden control characters, collapses every run of whitespace
/// (including newlines and non-breaking spaces) to a single space, and trims
/// both ends.
pub fn clean_text(s: &str) -> String {
    let stripped = strip_control_chars(s);
    let mut out = String::with_capacity(stripped.len());
    for word in stripped.split(|c: char| c.is_whitespace()).filter(|w| !w.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
