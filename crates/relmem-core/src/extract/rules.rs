//! Pattern-based entity extraction. Fast, offline, lower recall.

use regex::Regex;
use relmem_types::{EntityMention, EntityType};

/// Confidence assigned to lexicon hits.
const LEXICON_CONFIDENCE: f32 = 0.85;
/// Confidence assigned to shape-pattern hits (capitalized spans, metrics).
const PATTERN_CONFIDENCE: f32 = 0.6;

/// Known technology names, matched case-insensitively as whole words.
const TECH_LEXICON: &[&str] = &[
    "postgresql",
    "postgres",
    "mysql",
    "sqlite",
    "mongodb",
    "redis",
    "kafka",
    "rabbitmq",
    "kubernetes",
    "docker",
    "terraform",
    "aws",
    "gcp",
    "azure",
    "rust",
    "python",
    "typescript",
    "javascript",
    "react",
    "graphql",
    "grpc",
    "nginx",
    "linux",
];

/// Regex-driven extractor.
///
/// Patterns are compiled once at construction. The pattern set is
/// deliberately conservative: false positives pollute the entity table
/// for every future overlap computation, while misses only cost recall.
pub struct RuleExtractor {
    proper_noun: Regex,
    org_suffix: Regex,
    metric: Regex,
    tech_word: Regex,
}

impl RuleExtractor {
    pub fn new() -> Self {
        let lexicon = TECH_LEXICON.join("|");
        Self {
            // Two or more capitalized words in a row: "Alice Johnson",
            // "Project Falcon". Single capitalized words are too noisy
            // (sentence starts).
            proper_noun: Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)\b")
                .expect("static pattern"),
            org_suffix: Regex::new(
                r"\b([A-Z][A-Za-z]*(?:\s+[A-Z][A-Za-z]*)*\s+(?:Inc|Corp|LLC|Ltd|GmbH|Labs)\b\.?)",
            )
            .expect("static pattern"),
            // "42%", "120ms", "3.5x", "$1.2M"
            metric: Regex::new(r"\b(\$?\d+(?:\.\d+)?\s?(?:%|ms|s|x|k|M|B|GB|MB|qps|rps))\b")
                .expect("static pattern"),
            tech_word: Regex::new(&format!(r"(?i)\b({lexicon})\b"))
                .expect("static pattern"),
        }
    }

    /// Extract raw mentions. Duplicates are left for the caller's dedup.
    pub fn extract(&self, text: &str) -> Vec<EntityMention> {
        let mut mentions = Vec::new();

        for m in self.tech_word.find_iter(text) {
            mentions.push(EntityMention::new(
                m.as_str(),
                EntityType::Technology,
                LEXICON_CONFIDENCE,
            ));
        }

        for m in self.org_suffix.find_iter(text) {
            mentions.push(EntityMention::new(
                m.as_str().trim_end_matches('.'),
                EntityType::Organization,
                PATTERN_CONFIDENCE + 0.1,
            ));
        }

        for m in self.metric.find_iter(text) {
            mentions.push(EntityMention::new(
                m.as_str(),
                EntityType::Metric,
                PATTERN_CONFIDENCE,
            ));
        }

        for m in self.proper_noun.find_iter(text) {
            let span = m.as_str();
            // Organization suffixes already claimed this span
            if self.org_suffix.is_match(span) {
                continue;
            }
            mentions.push(EntityMention::new(span, EntityType::Person, PATTERN_CONFIDENCE));
        }

        mentions
    }
}

impl Default for RuleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<EntityMention> {
        RuleExtractor::new().extract(text)
    }

    #[test]
    fn test_technology_lexicon_case_insensitive() {
        let mentions = extract("we migrated from MySQL to PostgreSQL on kubernetes");
        let techs: Vec<_> = mentions
            .iter()
            .filter(|m| m.entity_type == EntityType::Technology)
            .map(|m| m.normalized_name())
            .collect();
        assert!(techs.contains(&"mysql".to_string()));
        assert!(techs.contains(&"postgresql".to_string()));
        assert!(techs.contains(&"kubernetes".to_string()));
    }

    #[test]
    fn test_organization_suffix() {
        let mentions = extract("the contract with Acme Corp was renewed");
        assert!(
            mentions
                .iter()
                .any(|m| m.entity_type == EntityType::Organization && m.name == "Acme Corp")
        );
    }

    #[test]
    fn test_metric_shapes() {
        let mentions = extract("latency dropped from 120ms to 45ms, a 62% improvement");
        let metrics: Vec<_> = mentions
            .iter()
            .filter(|m| m.entity_type == EntityType::Metric)
            .map(|m| m.name.as_str())
            .collect();
        assert!(metrics.contains(&"120ms"));
        assert!(metrics.contains(&"62%"));
    }

    #[test]
    fn test_multiword_proper_nouns() {
        let mentions = extract("Alice Johnson approved the rollout");
        assert!(
            mentions
                .iter()
                .any(|m| m.entity_type == EntityType::Person && m.name == "Alice Johnson")
        );
    }

    #[test]
    fn test_plain_text_yields_nothing() {
        assert!(extract("the quick brown fox jumps over the lazy dog").is_empty());
    }
}
