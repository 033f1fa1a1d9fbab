//! Full-text tokenization
//!
//! The same tokenizer runs on indexed text and on query text: split on every
//! non-alphanumeric character, drop empty pieces, lowercase the rest.

use std::collections::BTreeSet;

/// Tokenize text into lowercase terms, in order of appearance
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|piece| !piece.is_empty())
        .map(|piece| piece.to_lowercase())
        .collect()
}

/// Distinct terms of a text
pub fn unique_terms(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_and_folds() {
        assert_eq!(
            tokenize("The Rabbit Is Correct, And Clearly"),
            vec!["the", "rabbit", "is", "correct", "and", "clearly"]
        );
        assert_eq!(tokenize("one-liners"), vec!["one", "liners"]);
        assert!(tokenize("  ,.;  ").is_empty());
    }

    #[test]
    fn test_unique_terms() {
        let terms = unique_terms("Hey, hey HEY you");
        assert_eq!(terms.len(), 2);
        assert!(terms.contains("hey"));
    }

    #[test]
    fn test_non_ascii_letters_are_kept() {
        assert_eq!(tokenize("I’m Gonna"), vec!["i", "m", "gonna"]);
        assert_eq!(tokenize("Ünïcode wörds"), vec!["ünïcode", "wörds"]);
    }
}
