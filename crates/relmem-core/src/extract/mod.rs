//! Entity extraction.
//!
//! Two interchangeable strategies behind one entry point: the rule
//! extractor (regex patterns and a technology lexicon, no external calls)
//! and the LLM extractor (higher recall, fallible). The LLM path always
//! falls back to rules on failure, so extraction itself never errors.

mod llm;
mod rules;

use std::collections::HashMap;

use relmem_infer::SharedInference;
use relmem_types::EntityMention;
use tracing::{debug, warn};

pub use llm::LlmExtractor;
pub use rules::RuleExtractor;

use crate::config::ExtractionConfig;

/// Entity extractor with configurable strategy.
pub struct EntityExtractor {
    rules: RuleExtractor,
    llm: Option<LlmExtractor>,
    min_confidence: f32,
}

impl EntityExtractor {
    /// Rule-based extraction only.
    pub fn rule_based(config: &ExtractionConfig) -> Self {
        Self {
            rules: RuleExtractor::new(),
            llm: None,
            min_confidence: config.min_confidence,
        }
    }

    /// LLM extraction with rule fallback. When `use_llm` is off in the
    /// config the model is never consulted.
    pub fn with_inference(config: &ExtractionConfig, inference: SharedInference) -> Self {
        Self {
            rules: RuleExtractor::new(),
            llm: config.use_llm.then(|| LlmExtractor::new(inference)),
            min_confidence: config.min_confidence,
        }
    }

    /// Extract entity mentions from text, deduplicated by normalized name
    /// and type within the call.
    pub async fn extract(&self, text: &str) -> Vec<EntityMention> {
        let raw = match &self.llm {
            Some(llm) => match llm.extract(text).await {
                Ok(mentions) => mentions,
                Err(e) => {
                    warn!("LLM extraction failed, falling back to rules: {}", e);
                    self.rules.extract(text)
                }
            },
            None => self.rules.extract(text),
        };

        let mentions = dedup_mentions(raw, self.min_confidence);
        debug!("Extracted {} entities", mentions.len());
        mentions
    }
}

/// Collapse duplicate mentions, keeping the highest confidence per
/// (normalized name, type), and drop low-confidence ones.
fn dedup_mentions(raw: Vec<EntityMention>, min_confidence: f32) -> Vec<EntityMention> {
    let mut best: HashMap<(String, String), EntityMention> = HashMap::new();
    for mention in raw {
        if mention.name.trim().is_empty() {
            continue;
        }
        let key = (
            mention.normalized_name(),
            mention.entity_type.as_str().to_string(),
        );
        match best.get(&key) {
            Some(existing) if existing.confidence >= mention.confidence => {}
            _ => {
                best.insert(key, mention);
            }
        }
    }

    let mut mentions: Vec<_> = best
        .into_values()
        .filter(|m| m.confidence >= min_confidence)
        .collect();
    mentions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    mentions
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmem_infer::MockInference;
    use relmem_types::EntityType;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_dedup_keeps_highest_confidence() {
        let raw = vec![
            EntityMention::new("PostgreSQL", EntityType::Technology, 0.7),
            EntityMention::new("postgresql", EntityType::Technology, 0.9),
            EntityMention::new("", EntityType::Concept, 0.9),
        ];
        let deduped = dedup_mentions(raw, 0.5);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].confidence, 0.9);
    }

    #[test]
    fn test_dedup_drops_below_min_confidence() {
        let raw = vec![
            EntityMention::new("Maybe", EntityType::Concept, 0.2),
            EntityMention::new("Sure", EntityType::Concept, 0.8),
        ];
        let deduped = dedup_mentions(raw, 0.5);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].name, "Sure");
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_rules() {
        let config = ExtractionConfig::default();
        let extractor =
            EntityExtractor::with_inference(&config, Arc::new(MockInference::failing()));

        let mentions = extractor
            .extract("Alice Johnson deployed PostgreSQL for Acme Corp")
            .await;
        assert!(
            mentions
                .iter()
                .any(|m| m.entity_type == EntityType::Technology)
        );
    }

    #[tokio::test]
    async fn test_llm_result_used_when_available() {
        let config = ExtractionConfig::default();
        let inference = Arc::new(MockInference::always(json!({
            "entities": [
                {"name": "Project Falcon", "type": "product", "confidence": 0.95}
            ]
        })));
        let extractor = EntityExtractor::with_inference(&config, inference);

        let mentions = extractor.extract("kickoff notes for Project Falcon").await;
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].name, "Project Falcon");
        assert_eq!(mentions[0].entity_type, EntityType::Product);
    }
}
