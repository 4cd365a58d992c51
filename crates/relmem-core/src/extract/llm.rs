//! Model-based entity extraction.

use relmem_infer::{InferError, SharedInference};
use relmem_types::{EntityMention, EntityType};
use serde::Deserialize;
use tracing::debug;

/// LLM-backed extractor. Builds a strict-JSON prompt and parses the reply;
/// anything the model invents outside the closed type set is dropped.
pub struct LlmExtractor {
    inference: SharedInference,
}

#[derive(Debug, Deserialize)]
struct ExtractionReply {
    #[serde(default)]
    entities: Vec<RawEntity>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.7
}

impl LlmExtractor {
    pub fn new(inference: SharedInference) -> Self {
        Self { inference }
    }

    pub async fn extract(&self, text: &str) -> Result<Vec<EntityMention>, InferError> {
        let prompt = build_prompt(text);
        let value = self.inference.infer(&prompt).await?;
        let reply: ExtractionReply = serde_json::from_value(value)
            .map_err(|e| InferError::InvalidResponse(format!("entity reply: {}", e)))?;

        let mut mentions = Vec::new();
        for raw in reply.entities {
            let Some(entity_type) = EntityType::parse(&raw.entity_type) else {
                debug!("Dropping entity with unknown type {:?}", raw.entity_type);
                continue;
            };
            mentions.push(EntityMention::new(
                raw.name,
                entity_type,
                raw.confidence.clamp(0.0, 1.0),
            ));
        }
        Ok(mentions)
    }
}

fn build_prompt(text: &str) -> String {
    let types: Vec<&str> = EntityType::all().iter().map(|t| t.as_str()).collect();
    format!(
        r#"Extract named entities from the text below.

Allowed types: {types}

Respond with JSON only, no prose, in this shape:
{{"entities": [{{"name": "...", "type": "...", "confidence": 0.0}}]}}

Text:
{text}"#,
        types = types.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmem_infer::MockInference;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_parses_well_formed_reply() {
        let inference = Arc::new(MockInference::always(json!({
            "entities": [
                {"name": "Acme Corp", "type": "organization", "confidence": 0.9},
                {"name": "Redis", "type": "technology"}
            ]
        })));
        let extractor = LlmExtractor::new(inference);

        let mentions = extractor.extract("Acme Corp adopted Redis").await.unwrap();
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[1].confidence, 0.7); // defaulted
    }

    #[tokio::test]
    async fn test_drops_unknown_types() {
        let inference = Arc::new(MockInference::always(json!({
            "entities": [
                {"name": "Thing", "type": "gadget", "confidence": 0.9},
                {"name": "Berlin", "type": "location", "confidence": 0.9}
            ]
        })));
        let extractor = LlmExtractor::new(inference);

        let mentions = extractor.extract("Thing in Berlin").await.unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].entity_type, EntityType::Location);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_invalid_response() {
        let inference = Arc::new(MockInference::always(json!({"entities": "nope"})));
        let extractor = LlmExtractor::new(inference);

        let err = extractor.extract("anything").await.unwrap_err();
        assert!(matches!(err, InferError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_prompt_mentions_text_and_types() {
        let inference = Arc::new(MockInference::always(json!({"entities": []})));
        let extractor = LlmExtractor::new(inference.clone());

        extractor.extract("the payload text").await.unwrap();
        let prompts = inference.prompts();
        assert!(prompts[0].contains("the payload text"));
        assert!(prompts[0].contains("organization"));
    }
}
