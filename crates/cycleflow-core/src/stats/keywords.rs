//! Word frequency over free-text reflections.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const MIN_WORD_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "all", "also", "and", "any", "are", "because", "been", "before",
    "but", "can", "could", "did", "didn", "does", "doing", "don", "for", "from", "get", "got",
    "had", "has", "have", "her", "him", "his", "how", "into", "its", "just", "like", "more",
    "much", "not", "now", "off", "only", "other", "our", "out", "over", "really", "she", "should",
    "some", "still", "than", "that", "the", "their", "them", "then", "there", "these", "they",
    "this", "too", "very", "was", "were", "what", "when", "which", "while", "who", "will",
    "with", "would", "you", "your",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub word: String,
    pub count: usize,
}

/// The `limit` most frequent words across `texts`.
///
/// Words are lowercased and split on anything that is not alphanumeric or an
/// apostrophe. Stop words and words shorter than three characters are
/// dropped. Ties are broken alphabetically.
pub fn top_keywords<'a>(texts: impl IntoIterator<Item = &'a str>, limit: usize) -> Vec<KeywordCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        let lower = text.to_lowercase();
        for word in lower
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .map(|w| w.trim_matches('\''))
        {
            if word.chars().count() < MIN_WORD_LEN || STOP_WORDS.contains(&word) {
                continue;
            }
            *counts.entry(word.to_string()).or_default() += 1;
        }
    }

    let mut ranked: Vec<KeywordCount> = counts
        .into_iter()
        .map(|(word, count)| KeywordCount { word, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
    ranked.truncate(limit);
    ranked
}
