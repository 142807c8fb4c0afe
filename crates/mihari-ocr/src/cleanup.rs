use unicode_normalization::UnicodeNormalization;

/// Normalize recognized text before translation: NFKC, then join
/// lines without inserting spaces (CJK text carries no word breaks).
pub fn clean_recognized(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }

    let normalized: String = text.nfkc().collect();
    normalized
        .replace(['\n', '\r'], "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_lines_without_spaces() {
        assert_eq!(clean_recognized("こん\nにちは\r\n"), "こんにちは");
    }

    #[test]
    fn applies_nfkc_normalization() {
        // Full-width digits fold to ASCII under NFKC.
        assert_eq!(clean_recognized("１２３"), "123");
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert_eq!(clean_recognized("  \n \r "), "");
    }
}
