//! Place-name normalization.
//!
//! - Unicode NFKD decomposition with combining marks removed ("São" -> "sao")
//! - Lowercase conversion
//! - Punctuation replaced by spaces (apostrophes are dropped)
//! - Whitespace collapsed

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a place name for comparison and cache keys.
pub fn normalize_name(s: &str) -> String {
    let folded: String = s
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| *c != '\'' && *c != '’')
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(normalize_name("  San   FRANCISCO "), "san francisco");
    }

    #[test]
    fn test_diacritics_removed() {
        assert_eq!(normalize_name("São Paulo"), "sao paulo");
        assert_eq!(normalize_name("Zürich"), "zurich");
        assert_eq!(normalize_name("Ciudad de México"), "ciudad de mexico");
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(normalize_name("St. Louis"), "st louis");
        assert_eq!(normalize_name("Hawai'i"), "hawaii");
        assert_eq!(normalize_name("Washington, D.C."), "washington d c");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize_name("  ...  "), "");
    }
}
