//! Case-insensitive word tokenizer
use regex::Regex;
use std::sync::OnceLock;

fn word_pattern() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    // Letters and digits; everything else (whitespace, punctuation) separates
    WORD.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("static word pattern is valid"))
}

/// Lowercased word tokens in order of appearance
pub fn tokenize(text: &str) -> Vec<String> {
    word_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_whitespace_and_punctuation() {
        assert_eq!(
            tokenize("Kubernetes, cluster-autoscaling (v2)!"),
            vec!["kubernetes", "cluster", "autoscaling", "v2"]
        );
    }

    #[test]
    fn test_lowercases_unicode() {
        assert_eq!(tokenize("Équipe  ÜBER"), vec!["équipe", "über"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("  ... ").is_empty());
    }
}
