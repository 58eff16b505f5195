//! TF-IDF importance scoring.
//!
//! Tokens are lowercase runs of two or more word characters. English stop
//! words are removed before unigrams and bigrams are built. Document
//! frequencies use the smoothed idf `ln((1 + n) / (1 + df)) + 1` and every
//! row is L2-normalised, so a message's importance (its row sum) grows
//! with the number of distinct, rare terms it carries.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "back", "be", "became", "because", "become", "becomes", "been",
    "before", "beforehand", "behind", "being", "below", "beside", "besides", "between", "beyond",
    "both", "but", "by", "can", "cannot", "could", "do", "done", "down", "due", "during", "each",
    "eg", "either", "else", "elsewhere", "enough", "etc", "even", "ever", "every", "everyone",
    "everything", "everywhere", "except", "few", "for", "former", "formerly", "from", "further",
    "get", "give", "go", "had", "has", "have", "he", "hence", "her", "here", "hereafter",
    "hereby", "herein", "hers", "herself", "him", "himself", "his", "how", "however", "i", "ie",
    "if", "in", "indeed", "into", "is", "it", "its", "itself", "just", "keep", "last", "latter",
    "least", "less", "made", "many", "may", "me", "meanwhile", "might", "mine", "more",
    "moreover", "most", "mostly", "much", "must", "my", "myself", "namely", "neither", "never",
    "nevertheless", "next", "no", "nobody", "none", "nor", "not", "nothing", "now", "nowhere",
    "of", "off", "often", "on", "once", "one", "only", "onto", "or", "other", "others",
    "otherwise", "our", "ours", "ourselves", "out", "over", "own", "per", "perhaps", "please",
    "put", "rather", "re", "same", "see", "seem", "seemed", "seeming", "seems", "several", "she",
    "should", "since", "so", "some", "somehow", "someone", "something", "sometime", "sometimes",
    "somewhere", "still", "such", "than", "that", "the", "their", "them", "themselves", "then",
    "thence", "there", "thereafter", "thereby", "therefore", "therein", "these", "they", "this",
    "those", "though", "through", "throughout", "thru", "thus", "to", "together", "too", "toward",
    "towards", "under", "until", "up", "upon", "us", "very", "via", "was", "we", "well", "were",
    "what", "whatever", "when", "whence", "whenever", "where", "whereas", "whereby", "wherein",
    "whether", "which", "while", "who", "whoever", "whole", "whom", "whose", "why", "will",
    "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("token pattern is valid"))
}

fn stop_words() -> &'static HashSet<&'static str> {
    static STOP: OnceLock<HashSet<&'static str>> = OnceLock::new();
    STOP.get_or_init(|| ENGLISH_STOP_WORDS.iter().copied().collect())
}

pub fn is_stop_word(word: &str) -> bool {
    stop_words().contains(word)
}

/// Lowercase content words of `text`, stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    token_regex()
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| !is_stop_word(w))
        .map(str::to_string)
        .collect()
}

/// Unigrams and adjacent bigrams of the content words.
fn terms(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let bigrams: Vec<String> = tokens.windows(2).map(|w| format!("{} {}", w[0], w[1])).collect();
    let mut terms = tokens;
    terms.extend(bigrams);
    terms
}

/// Sparse TF-IDF matrix: one row per document, `(term index, weight)` pairs.
#[derive(Debug, Clone, Default)]
pub struct TfidfMatrix {
    vocabulary: Vec<String>,
    rows: Vec<Vec<(usize, f64)>>,
}

impl TfidfMatrix {
    /// Fit on `documents` and transform them in one pass.
    pub fn fit_transform<S: AsRef<str>>(documents: &[S]) -> Self {
        let docs: Vec<Vec<String>> = documents.iter().map(|d| terms(d.as_ref())).collect();

        // Sorted vocabulary keeps term indices stable across runs.
        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in &docs {
            let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for term in unique {
                *df.entry(term).or_insert(0) += 1;
            }
        }
        let index: HashMap<&str, usize> = df.keys().enumerate().map(|(i, t)| (*t, i)).collect();
        let n = docs.len() as f64;
        let idf: Vec<f64> = df
            .values()
            .map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
            .collect();

        let rows = docs
            .iter()
            .map(|doc| {
                let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
                for term in doc {
                    if let Some(&i) = index.get(term.as_str()) {
                        *counts.entry(i).or_insert(0.0) += 1.0;
                    }
                }
                let mut row: Vec<(usize, f64)> =
                    counts.into_iter().map(|(i, tf)| (i, tf * idf[i])).collect();
                let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for (_, w) in &mut row {
                        *w /= norm;
                    }
                }
                row
            })
            .collect();

        Self {
            vocabulary: df.keys().map(|t| t.to_string()).collect(),
            rows,
        }
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    /// Importance of each document: the sum of its row.
    pub fn importance(&self) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|(_, w)| w).sum())
            .collect()
    }

    /// Highest-weighted terms of one document.
    pub fn top_terms(&self, row: usize, k: usize) -> Vec<&str> {
        let Some(row) = self.rows.get(row) else {
            return Vec::new();
        };
        let mut weighted: Vec<&(usize, f64)> = row.iter().collect();
        weighted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        weighted
            .into_iter()
            .take(k)
            .map(|(i, _)| self.vocabulary[*i].as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stop_words_and_short_tokens() {
        assert_eq!(
            tokenize("The Rust 1.80 release is a big deal, I think!"),
            vec!["rust", "80", "release", "big", "deal", "think"]
        );
    }

    #[test]
    fn test_terms_include_bigrams() {
        let terms = terms("rust borrow checker");
        assert!(terms.contains(&"rust borrow".to_string()));
        assert!(terms.contains(&"borrow checker".to_string()));
        assert_eq!(terms.len(), 5);
    }

    #[test]
    fn test_rows_are_unit_length() {
        let m = TfidfMatrix::fit_transform(&["rust async runtime", "tokio async runtime tasks"]);
        for row in &m.rows {
            let norm: f64 = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_richer_messages_score_higher() {
        let docs = [
            "I am",
            "nice",
            "Funding round closed at 4M led by two seed funds, hiring three engineers next",
            "hiring",
        ];
        let importance = TfidfMatrix::fit_transform(&docs).importance();
        let best = importance
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(best, Some(2));
        // Only stop words or one-letter tokens: empty row.
        assert_eq!(importance[0], 0.0);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let m = TfidfMatrix::fit_transform(&["rust meetup", "rust release", "rust conference"]);
        let top = m.top_terms(0, 1);
        assert_eq!(top, vec!["meetup"]);
    }

    #[test]
    fn test_empty_corpus() {
        let m = TfidfMatrix::fit_transform::<&str>(&[]);
        assert_eq!(m.rows(), 0);
        assert!(m.importance().is_empty());
        assert!(m.top_terms(3, 2).is_empty());
    }
}
