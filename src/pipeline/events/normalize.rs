/// Spaces substituted for each horizontal tab.
const TAB_SPACES: &str = "    ";

/// Canonicalize raw input before any parsing.
///
/// Every line-ending variant becomes `\n`, tabs become a fixed run of
/// spaces, and surrounding whitespace is trimmed. Total and idempotent.
pub fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace(['\r', '\u{2028}', '\u{2029}', '\u{0085}'], "\n")
        .replace('\t', TAB_SPACES)
        .trim()
        .to_string()
}
