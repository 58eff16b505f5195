//! Entity extraction from message text.

use std::collections::HashSet;

use regex::Regex;

use crate::types::{EntityKind, ExtractedEntity};

/// Extracts mentions, URLs, hashtags, money amounts, dates and person names.
pub struct EntityExtractor {
    mention: Regex,
    url: Regex,
    hashtag: Regex,
    money: Regex,
    date_iso: Regex,
    date_relative: Regex,
    person: Regex,
}

impl EntityExtractor {
    pub fn new() -> Self {
        Self {
            mention: Regex::new(r"(?:^|[\s(])@([A-Za-z][A-Za-z0-9_]{2,31})\b").expect("mention pattern"),
            url: Regex::new(r#"https?://[^\s<>")\]]+"#).expect("url pattern"),
            hashtag: Regex::new(r"(?:^|[\s(])#([A-Za-z][A-Za-z0-9_-]+)").expect("hashtag pattern"),
            money: Regex::new(
                r"(?i)(?:[$€£]\d[\d,]*(?:\.\d+)?\s*[kmb]?\b|\b\d[\d,]*(?:\.\d+)?\s*(?:usd|eur|gbp|usdc|usdt|dollars?|euros?)\b)",
            )
            .expect("money pattern"),
            date_iso: Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("date pattern"),
            date_relative: Regex::new(
                r"(?i)\b(yesterday|today|tonight|tomorrow|(?:last|next|this)\s+(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|week|month|year))\b",
            )
            .expect("relative date pattern"),
            person: Regex::new(
                r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)(?:'s\b|\s+(?:said|says|mentioned|suggested|reported|asked|noted|confirmed|proposed|thinks|wrote))",
            )
            .expect("person pattern"),
        }
    }

    /// All recognised entities in `text`, in pattern order, without repeats.
    pub fn extract(&self, text: &str) -> Vec<ExtractedEntity> {
        let mut found = Found::default();

        for caps in self.mention.captures_iter(text) {
            if let Some(name) = caps.get(1) {
                found.push(EntityKind::Mention, format!("@{}", name.as_str()), 0.95);
            }
        }
        let mut url_spans = Vec::new();
        for m in self.url.find_iter(text) {
            let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
            url_spans.push(m.range());
            found.push(EntityKind::Url, url.to_string(), 1.0);
        }
        for caps in self.hashtag.captures_iter(text) {
            if let Some(tag) = caps.get(1) {
                if !url_spans.iter().any(|span| span.contains(&tag.start())) {
                    found.push(EntityKind::Hashtag, format!("#{}", tag.as_str()), 1.0);
                }
            }
        }
        for m in self.money.find_iter(text) {
            found.push(EntityKind::Money, m.as_str().trim().to_string(), 0.95);
        }
        for m in self.date_iso.find_iter(text) {
            found.push(EntityKind::Date, m.as_str().to_string(), 1.0);
        }
        for m in self.date_relative.find_iter(text) {
            found.push(EntityKind::Date, m.as_str().to_lowercase(), 0.9);
        }
        for caps in self.person.captures_iter(text) {
            if let Some(name) = caps.get(1) {
                if !is_common_word(name.as_str()) {
                    found.push(EntityKind::Person, name.as_str().to_string(), 0.7);
                }
            }
        }

        found.entities
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Found {
    seen: HashSet<(EntityKind, String)>,
    entities: Vec<ExtractedEntity>,
}

impl Found {
    fn push(&mut self, kind: EntityKind, value: String, confidence: f32) {
        if self.seen.insert((kind, value.to_lowercase())) {
            self.entities.push(ExtractedEntity {
                kind,
                value,
                confidence,
            });
        }
    }
}

/// Capitalised words that start sentences far more often than they name people.
fn is_common_word(s: &str) -> bool {
    let first = s.split_whitespace().next().unwrap_or(s);
    matches!(
        first,
        "The"
            | "This"
            | "That"
            | "These"
            | "Those"
            | "There"
            | "Here"
            | "When"
            | "Where"
            | "What"
            | "Which"
            | "They"
            | "Someone"
            | "Everyone"
            | "Nobody"
            | "Monday"
            | "Tuesday"
            | "Wednesday"
            | "Thursday"
            | "Friday"
            | "Saturday"
            | "Sunday"
            | "January"
            | "February"
            | "March"
            | "April"
            | "May"
            | "June"
            | "July"
            | "August"
            | "September"
            | "October"
            | "November"
            | "December"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn of_kind(text: &str, kind: EntityKind) -> Vec<ExtractedEntity> {
        EntityExtractor::new()
            .extract(text)
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    fn values(entities: &[ExtractedEntity]) -> Vec<&str> {
        entities.iter().map(|e| e.value.as_str()).collect()
    }

    #[test]
    fn test_extract_mentions_skips_emails() {
        let mentions = of_kind("ping @alice_dev and (@bob42), not carol@example.com", EntityKind::Mention);
        assert_eq!(values(&mentions), vec!["@alice_dev", "@bob42"]);
        assert!((mentions[0].confidence - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn test_extract_urls() {
        let urls = of_kind(
            "Visit https://example.com/docs. Also http://docs.rs/tokio, thanks",
            EntityKind::Url,
        );
        assert_eq!(values(&urls), vec!["https://example.com/docs", "http://docs.rs/tokio"]);
    }

    #[test]
    fn test_hashtags_outside_urls() {
        let tags = of_kind(
            "#rustlang news https://site.io/#anchor and #async-io",
            EntityKind::Hashtag,
        );
        assert_eq!(values(&tags), vec!["#rustlang", "#async-io"]);
    }

    #[test]
    fn test_extract_money() {
        let money = of_kind("Raised $4.5M, grants of 200 EUR and 1,000 USDC", EntityKind::Money);
        assert_eq!(values(&money), vec!["$4.5M", "200 EUR", "1,000 USDC"]);
    }

    #[test]
    fn test_extract_dates() {
        let dates = of_kind("Launch on 2024-06-01, demo next Friday or Tomorrow", EntityKind::Date);
        assert_eq!(values(&dates), vec!["2024-06-01", "next friday", "tomorrow"]);
        assert!((dates[1].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_extract_person_names() {
        let people = of_kind(
            "Alice Smith said the audit is done. Bob's PR landed. The said thing.",
            EntityKind::Person,
        );
        assert_eq!(values(&people), vec!["Alice Smith", "Bob"]);
        assert!((people[0].confidence - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_repeats_are_dropped() {
        let entities = EntityExtractor::new().extract("#Rust and #rust again, @ana @ana");
        assert_eq!(values(&entities), vec!["@ana", "#Rust"]);
    }

    #[test]
    fn test_empty_text() {
        assert!(EntityExtractor::new().extract("").is_empty());
    }
}
