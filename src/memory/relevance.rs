//! Relevance scoring between messages
//!
//! Blends keyword-set overlap (Jaccard) with bag-of-words cosine similarity.
//! Both measures are symmetric, so the blended score is too.

use crate::memory::keywords::extract_keywords;
use crate::models::Message;
use std::collections::{HashMap, HashSet};

const KEYWORD_WEIGHT: f64 = 0.6;
const COSINE_WEIGHT: f64 = 0.4;

/// Score two optional messages; an absent side scores 0
pub fn calculate_relevance(a: Option<&Message>, b: Option<&Message>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => message_relevance(a, b),
        _ => 0.0,
    }
}

pub fn message_relevance(a: &Message, b: &Message) -> f64 {
    content_relevance(&a.content, &b.content)
}

/// Relevance in [0, 1] between two pieces of text
pub fn content_relevance(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    let keywords_a: HashSet<String> = extract_keywords(&a).into_iter().collect();
    let keywords_b: HashSet<String> = extract_keywords(&b).into_iter().collect();

    let union = keywords_a.union(&keywords_b).count();
    if union == 0 {
        return 0.0;
    }

    let common = keywords_a.intersection(&keywords_b).count();
    let keyword_score = common as f64 / union as f64;

    let score = KEYWORD_WEIGHT * keyword_score + COSINE_WEIGHT * cosine_similarity(&a, &b);
    score.clamp(0.0, 1.0)
}

/// Cosine similarity over raw whitespace-token counts
pub fn cosine_similarity(a: &str, b: &str) -> f64 {
    let counts_a = token_counts(a);
    let counts_b = token_counts(b);

    // Integer accumulation keeps the result exactly symmetric
    let dot: u64 = counts_a
        .iter()
        .filter_map(|(token, count)| counts_b.get(token).map(|other| count * other))
        .sum();
    let magnitude_a = squared_norm(&counts_a);
    let magnitude_b = squared_norm(&counts_b);

    if magnitude_a == 0 || magnitude_b == 0 {
        return 0.0;
    }

    dot as f64 / ((magnitude_a as f64).sqrt() * (magnitude_b as f64).sqrt())
}

fn token_counts(text: &str) -> HashMap<&str, u64> {
    let mut counts = HashMap::new();
    for token in text.split_whitespace() {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

fn squared_norm(counts: &HashMap<&str, u64>) -> u64 {
    counts.values().map(|count| count * count).sum()
}
