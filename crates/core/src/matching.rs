//! Title token matching.

use std::collections::HashSet;

/// Lower-case, fold `ё` to `е`, and split on anything that is not a Latin or
/// Cyrillic letter or a digit.
pub fn normalize_title_tokens(value: &str) -> Vec<String> {
    value
        .to_lowercase()
        .replace('ё', "е")
        .split(|c: char| !(c.is_ascii_alphanumeric() || ('а'..='я').contains(&c)))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Shared tokens divided by the size of the smaller token set. Zero when either
/// side has no tokens.
pub fn tokens_similarity(a: &str, b: &str) -> f64 {
    let ta: HashSet<String> = normalize_title_tokens(a).into_iter().collect();
    let tb: HashSet<String> = normalize_title_tokens(b).into_iter().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let common = ta.intersection(&tb).count();
    common as f64 / ta.len().min(tb.len()) as f64
}

/// How many tokens of `candidate` appear in `target`.
pub fn shared_token_count(candidate: &str, target: &[String]) -> usize {
    normalize_title_tokens(candidate)
        .iter()
        .filter(|t| target.contains(t))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title_tokens() {
        assert_eq!(
            normalize_title_tokens("Pink Floyd - The Wall (1979) [FLAC]"),
            vec!["pink", "floyd", "the", "wall", "1979", "flac"]
        );
        assert_eq!(
            normalize_title_tokens("Кино — Группа Крови, Ёлка"),
            vec!["кино", "группа", "крови", "елка"]
        );
        assert!(normalize_title_tokens(" -- ").is_empty());
    }

    #[test]
    fn test_tokens_similarity() {
        assert_eq!(tokens_similarity("The Wall", "Pink Floyd - The Wall 1979"), 1.0);
        assert_eq!(tokens_similarity("a b c d", "a b x y"), 0.5);
        assert_eq!(tokens_similarity("", "anything"), 0.0);
        assert_eq!(tokens_similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_shared_token_count() {
        let target = normalize_title_tokens("The Wall 1979");
        assert_eq!(shared_token_count("1979 - The Wall [FLAC]", &target), 3);
        assert_eq!(shared_token_count("Animals 1977", &target), 0);
    }
}
