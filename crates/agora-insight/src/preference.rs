//! First-person preference statements ("I love ...", "I hate ...").

use regex::Regex;

use crate::types::{ExtractedPreference, Polarity};

/// Longest preference value kept, in words.
const MAX_VALUE_WORDS: usize = 6;

pub struct PreferenceExtractor {
    pattern: Regex,
}

impl PreferenceExtractor {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(
                r"(?i)\bI(?:\s+really|\s+truly|\s+absolutely)?\s+(like|love|enjoy|prefer|hate|dislike)\s+([^.!?,;:\n]+)",
            )
            .expect("preference pattern"),
        }
    }

    pub fn extract(&self, text: &str) -> Vec<ExtractedPreference> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let verb = caps.get(1)?.as_str().to_lowercase();
                let value = clean_value(caps.get(2)?.as_str())?;
                let polarity = match verb.as_str() {
                    "hate" | "dislike" => Polarity::Negative,
                    _ => Polarity::Positive,
                };
                Some(ExtractedPreference {
                    polarity,
                    verb,
                    value,
                })
            })
            .collect()
    }
}

impl Default for PreferenceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Trim filler, cap the length, and reject values that say nothing.
fn clean_value(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw
        .split_whitespace()
        .take(MAX_VALUE_WORDS)
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '#' && c != '+'))
        .filter(|w| !w.is_empty())
        .collect();
    let words: Vec<&str> = match words.first().map(|w| w.to_lowercase()) {
        Some(first) if matches!(first.as_str(), "to" | "the" | "a" | "an") => words[1..].to_vec(),
        _ => words,
    };
    match words.as_slice() {
        [] => None,
        [only] if matches!(only.to_lowercase().as_str(), "it" | "that" | "this" | "them") => None,
        _ => Some(words.join(" ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_and_negative() {
        let prefs = PreferenceExtractor::new()
            .extract("I really love rust meetups. But I hate long standups, honestly.");
        assert_eq!(prefs.len(), 2);
        assert_eq!(prefs[0].polarity, Polarity::Positive);
        assert_eq!(prefs[0].verb, "love");
        assert_eq!(prefs[0].value, "rust meetups");
        assert_eq!(prefs[1].polarity, Polarity::Negative);
        assert_eq!(prefs[1].value, "long standups");
    }

    #[test]
    fn test_leading_article_and_length_cap() {
        let prefs = PreferenceExtractor::new()
            .extract("i prefer to work from home on the quiet days of every week");
        assert_eq!(prefs[0].value, "work from home on the");
    }

    #[test]
    fn test_pronoun_only_is_ignored() {
        assert!(PreferenceExtractor::new().extract("I like it!").is_empty());
        assert!(PreferenceExtractor::new().extract("Nobody likes mondays").is_empty());
    }
}
