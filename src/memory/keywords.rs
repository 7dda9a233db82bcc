//! Keyword extraction
//!
//! Turns free text into lowercase content-bearing words. Punctuation and
//! non-word characters become separators; short tokens and stop words drop out.

/// Static stop word list
const STOP_WORDS: &[&str] = &[
    // Articles & conjunctions
    "the", "a", "an", "and", "or", "but",
    // Prepositions
    "in", "on", "at", "to", "for", "of", "with", "by",
    // Auxiliary verbs
    "is", "are", "was", "were", "be", "been", "being",
    "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "can",
    // Demonstratives
    "this", "that", "these", "those",
    // Pronouns
    "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
];

/// Tokens of this length or shorter are never keywords
const MIN_KEYWORD_LEN: usize = 3;

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Extract keywords in their original order, duplicates preserved
pub fn extract_keywords(text: &str) -> Vec<String> {
    let normalized: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c.is_whitespace() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();

    normalized
        .split_whitespace()
        .filter(|word| word.len() >= MIN_KEYWORD_LEN && !is_stop_word(word))
        .map(str::to_string)
        .collect()
}
