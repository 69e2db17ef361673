//! Keyword extraction shared by the relevance searches.

/// Words shorter than this carry too little signal to rank on.
const MIN_WORD_LEN: usize = 3;

/// Cap on the number of terms taken from one query.
const MAX_TERMS: usize = 32;

const STOPWORDS: [&str; 24] = [
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "her", "was", "one", "our",
    "out", "what", "with", "this", "that", "have", "from", "they", "will", "your", "about",
];

/// Lower-cased, de-duplicated alphanumeric terms of `text`, in order of first appearance.
pub fn extract(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if word.chars().count() < MIN_WORD_LEN {
            continue;
        }
        let word = word.to_lowercase();
        if STOPWORDS.contains(&word.as_str()) || terms.contains(&word) {
            continue;
        }
        terms.push(word);
        if terms.len() == MAX_TERMS {
            break;
        }
    }
    terms
}
