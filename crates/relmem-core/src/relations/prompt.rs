//! Prompt construction and reply parsing for model-based relation inference.

use relmem_infer::InferError;
use relmem_types::{MemoryEntry, RelationType};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::rules::ProposedRelation;

#[derive(Debug, Deserialize)]
struct RelationReply {
    #[serde(default)]
    relations: Vec<RawRelation>,
}

#[derive(Debug, Deserialize)]
struct RawRelation {
    #[serde(rename = "type")]
    relation_type: String,
    strength: f32,
    #[serde(default)]
    reason: Option<String>,
}

/// Build the relation-inference prompt for a directed pair.
pub fn build_prompt(source: &MemoryEntry, target: &MemoryEntry) -> String {
    let types: Vec<&str> = RelationType::all().iter().map(|t| t.as_str()).collect();
    format!(
        r#"Two memory entries from the same knowledge base are shown below.
Identify every relation that holds FROM entry A TO entry B.

Allowed relation types: {types}

Respond with JSON only, no prose, in this shape:
{{"relations": [{{"type": "...", "strength": 0.0, "reason": "..."}}]}}

Return an empty list if no relation holds.

Entry A ({a_kind}, recorded {a_at}):
{a}

Entry B ({b_kind}, recorded {b_at}):
{b}"#,
        types = types.join(", "),
        a_kind = source.content_type.as_str(),
        a_at = source.created_at.to_rfc3339(),
        a = source.content,
        b_kind = target.content_type.as_str(),
        b_at = target.created_at.to_rfc3339(),
        b = target.content,
    )
}

/// Parse a model reply into proposed relations, dropping unknown types and
/// clamping strengths.
pub fn parse_reply(value: Value) -> Result<Vec<ProposedRelation>, InferError> {
    let reply: RelationReply = serde_json::from_value(value)
        .map_err(|e| InferError::InvalidResponse(format!("relation reply: {}", e)))?;

    let mut proposed = Vec::new();
    for raw in reply.relations {
        let Some(relation_type) = RelationType::parse(&raw.relation_type) else {
            debug!("Dropping relation with unknown type {:?}", raw.relation_type);
            continue;
        };
        proposed.push(ProposedRelation {
            relation_type,
            strength: raw.strength.clamp(0.0, 1.0),
            reason: raw.reason.unwrap_or_else(|| "model inference".to_string()),
        });
    }
    Ok(proposed)
}
