//! Pattern-based entity extraction and co-occurrence relations.
//!
//! No model loading: entities are found with a configurable pattern table
//! plus a capitalized-phrase fallback, and relations are derived from
//! co-occurrence within a chunk. Both implement the core pipeline traits,
//! so a model-backed extractor can replace them without touching the
//! engine.

use regex::Regex;

use trellis_core::error::{Error, Result};
use trellis_core::models::{EdgeType, Entity, NewEdge, NodeRef};
use trellis_core::pipeline::{EntityExtractor, ExtractedEntity, RelationExtractor};

/// One row of the pattern table: what to match and how to tag it.
struct PatternRule {
    regex: Regex,
    entity_type: String,
    confidence: f64,
}

/// Entity extractor driven by a pattern table.
///
/// Every regex match becomes an entity of the rule's type; a built-in
/// fallback tags capitalized multi-word phrases as `topic` with lower
/// confidence. Matches carry `confidence`, `start`, and `end` metadata.
pub struct PatternEntityExtractor {
    rules: Vec<PatternRule>,
}

impl PatternEntityExtractor {
    pub fn new() -> Result<Self> {
        let mut extractor = Self { rules: Vec::new() };
        // ISO dates and capitalized phrases are recognizable without any
        // domain knowledge; domain patterns are added on top.
        extractor.add_rule(r"\b\d{4}-\d{2}-\d{2}\b", "date", 0.95)?;
        // Intra-line whitespace only, so phrases never span paragraphs.
        extractor.add_rule(
            r"\b[A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)+\b",
            "topic",
            0.6,
        )?;
        Ok(extractor)
    }

    /// Register an additional pattern. Later rules win ties through higher
    /// confidence, not ordering.
    pub fn add_rule(&mut self, pattern: &str, entity_type: &str, confidence: f64) -> Result<()> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InvalidInput(format!("invalid entity pattern: {e}")))?;
        self.rules.push(PatternRule {
            regex,
            entity_type: entity_type.to_string(),
            confidence,
        });
        Ok(())
    }
}

impl EntityExtractor for PatternEntityExtractor {
    fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>> {
        let mut found: Vec<ExtractedEntity> = Vec::new();
        let mut seen: std::collections::HashMap<(String, String), usize> =
            std::collections::HashMap::new();

        for rule in &self.rules {
            for m in rule.regex.find_iter(text) {
                let name = m.as_str().trim().to_string();
                if name.is_empty() {
                    continue;
                }
                let mut entity = ExtractedEntity::new(name, rule.entity_type.clone())
                    .with_confidence(rule.confidence);
                entity
                    .metadata
                    .insert("start".into(), serde_json::json!(m.start()));
                entity
                    .metadata
                    .insert("end".into(), serde_json::json!(m.end()));

                // Keep the highest-confidence mention per (name, type).
                let key = entity.dedup_key();
                match seen.get(&key) {
                    Some(&i) if found[i].confidence() >= entity.confidence() => {}
                    Some(&i) => found[i] = entity,
                    None => {
                        seen.insert(key, found.len());
                        found.push(entity);
                    }
                }
            }
        }

        Ok(found)
    }
}

/// Links entities that co-occur within a chunk.
///
/// Each unordered entity pair gets one bidirectional `semantic` edge,
/// capped at `max_pairs` per chunk to keep entity-dense chunks from
/// exploding the graph.
pub struct CooccurrenceRelationExtractor {
    max_pairs: usize,
}

impl CooccurrenceRelationExtractor {
    pub fn new(max_pairs: usize) -> Self {
        Self { max_pairs }
    }
}

impl RelationExtractor for CooccurrenceRelationExtractor {
    fn extract_relations(
        &self,
        _text: &str,
        _chunk_id: i64,
        entities: &[Entity],
    ) -> Result<Vec<NewEdge>> {
        let mut edges = Vec::new();
        'outer: for (i, a) in entities.iter().enumerate() {
            for b in entities.iter().skip(i + 1) {
                if edges.len() >= self.max_pairs {
                    break 'outer;
                }
                let mut metadata = trellis_core::Metadata::new();
                metadata.insert("basis".into(), serde_json::json!("co_occurrence"));
                edges.push(
                    NewEdge::new(
                        NodeRef::Entity(a.id),
                        NodeRef::Entity(b.id),
                        EdgeType::Semantic,
                    )
                    .bidirectional()
                    .with_metadata(metadata),
                );
            }
        }
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::Metadata;

    #[test]
    fn test_extracts_dates_and_phrases() {
        let extractor = PatternEntityExtractor::new().unwrap();
        let entities = extractor
            .extract_entities("Ada Lovelace published notes on 1843-09-01.")
            .unwrap();

        let phrase = entities
            .iter()
            .find(|e| e.entity_type == "topic")
            .expect("capitalized phrase found");
        assert_eq!(phrase.name, "Ada Lovelace");
        assert!((phrase.confidence() - 0.6).abs() < 1e-9);
        assert!(phrase.metadata.contains_key("start"));

        let date = entities
            .iter()
            .find(|e| e.entity_type == "date")
            .expect("date found");
        assert_eq!(date.name, "1843-09-01");
    }

    #[test]
    fn test_custom_rule_and_dedup() {
        let mut extractor = PatternEntityExtractor::new().unwrap();
        extractor
            .add_rule(r"\bAda Lovelace\b", "person", 0.9)
            .unwrap();
        let entities = extractor
            .extract_entities("Ada Lovelace met Ada Lovelace.")
            .unwrap();

        // Repeated mention deduplicated per (name, type); person and topic
        // are distinct types so both survive.
        let people: Vec<_> = entities
            .iter()
            .filter(|e| e.entity_type == "person")
            .collect();
        assert_eq!(people.len(), 1);
        assert!((people[0].confidence() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_no_entities_in_plain_text() {
        let extractor = PatternEntityExtractor::new().unwrap();
        let entities = extractor
            .extract_entities("nothing capitalized or dated here.")
            .unwrap();
        assert!(entities.is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut extractor = PatternEntityExtractor::new().unwrap();
        assert!(extractor.add_rule("([unclosed", "broken", 0.5).is_err());
    }

    fn entity(id: i64, name: &str) -> Entity {
        Entity {
            id,
            name: name.to_string(),
            entity_type: "topic".to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_cooccurrence_pairs() {
        let extractor = CooccurrenceRelationExtractor::new(10);
        let entities = vec![entity(1, "A"), entity(2, "B"), entity(3, "C")];
        let edges = extractor.extract_relations("", 99, &entities).unwrap();
        assert_eq!(edges.len(), 3); // (A,B), (A,C), (B,C)
        for edge in &edges {
            assert_eq!(edge.edge_type, EdgeType::Semantic);
            assert!(edge.bidirectional);
            assert!(edge.source.entity_id().is_some());
            assert!(edge.target.entity_id().is_some());
        }
    }

    #[test]
    fn test_cooccurrence_cap() {
        let extractor = CooccurrenceRelationExtractor::new(2);
        let entities = vec![entity(1, "A"), entity(2, "B"), entity(3, "C"), entity(4, "D")];
        let edges = extractor.extract_relations("", 1, &entities).unwrap();
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn test_single_entity_yields_no_relations() {
        let extractor = CooccurrenceRelationExtractor::new(10);
        let edges = extractor
            .extract_relations("", 1, &[entity(1, "A")])
            .unwrap();
        assert!(edges.is_empty());
    }
}
