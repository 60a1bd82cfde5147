//! Spelling comparison for dictation answers.
//!
//! A catalog spelling may list variants separated by `/` (e.g. `colour/color`)
//! or by `,` (e.g. `wis, wit`). Matching is case-insensitive and ignores
//! surrounding whitespace.

/// All spellings accepted for a catalog entry, normalized.
pub fn accepted_spellings(spelling: &str) -> Vec<String> {
    spelling
        .split('/')
        .flat_map(|part| part.split(','))
        .map(normalize)
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn is_correct(spelling: &str, answer: &str) -> bool {
    let answer = normalize(answer);
    accepted_spellings(spelling).iter().any(|s| *s == answer)
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_slash_and_comma_variants() {
        assert_eq!(
            accepted_spellings("Colour / color"),
            vec!["colour".to_string(), "color".to_string()]
        );
        assert_eq!(
            accepted_spellings("wis, wit/wot"),
            vec!["wis".to_string(), "wit".to_string(), "wot".to_string()]
        );
    }

    #[test]
    fn matches_case_and_whitespace_insensitively() {
        assert!(is_correct("Apple", "  apple "));
        assert!(is_correct("colour/color", "COLOR"));
        assert!(is_correct("wis, wit", "wit"));
        assert!(!is_correct("apple", "aple"));
    }

    #[test]
    fn blank_answer_never_matches() {
        assert!(!is_correct("apple", ""));
        assert!(!is_correct("a/ /b", "  "));
    }
}
