

use regex::Regex;
use tracing::debug;

use super::dictionary::EntityDictionary;
use super::models::{QueryContext, QueryType};
use super::patterns::RoutingRules;
use crate::core::config::RagConfig;
use crate::core::error::{RagError, Result};


fn compile(patterns: &[String], what: &str) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| RagError::Config(format!("invalid {} pattern '{}': {}", what, p, e)))
        })
        .collect()
}


pub struct QueryClassifier {
    intent_rules: Vec<(QueryType, Vec<Regex>)>,
    complex_patterns: Vec<Regex>,
    relation_patterns: Vec<Regex>,
    known_pairs: Vec<(String, String)>,
    dictionary: EntityDictionary,
    length_threshold: usize,
    entity_threshold: usize,
}

impl QueryClassifier {
    /// Compiles every pattern up front; a bad regex is a configuration error.
    pub fn new(rules: &RoutingRules, length_threshold: usize, entity_threshold: usize) -> Result<Self> {
        let intent_rules = rules
            .intent_rules
            .iter()
            .map(|rule| Ok((rule.query_type, compile(&rule.patterns, rule.query_type.as_str())?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            intent_rules,
            complex_patterns: compile(&rules.complex_patterns, "complexity")?,
            relation_patterns: compile(&rules.relation_patterns, "relation")?,
            known_pairs: rules.known_pairs.clone(),
            dictionary: EntityDictionary::new(rules.entity_groups.clone()),
            length_threshold,
            entity_threshold,
        })
    }

    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(
            &config.routing,
            config.complex_query_length_threshold,
            config.complex_entity_threshold,
        )
    }

    pub fn classify(&self, query: &str) -> QueryContext {
        let query_type = self.detect_type(query);
        let entities = self.dictionary.extract(query);

        let relational = self.complex_patterns.iter().any(|re| re.is_match(query));
        let too_long = query.chars().count() > self.length_threshold;
        let many_entities = entities.len() > self.entity_threshold;

        debug!(
            "Classified '{}' as {} (relational={}, long={}, entities={})",
            crate::safe_truncate(query, 40),
            query_type.as_str(),
            relational,
            too_long,
            entities.len()
        );

        QueryContext {
            query: query.to_string(),
            query_type,
            is_complex: relational || too_long || many_entities,
            entities,
        }
    }

    fn detect_type(&self, query: &str) -> QueryType {
        self.intent_rules
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(query)))
            .map_or(QueryType::General, |(query_type, _)| *query_type)
    }

    pub fn matches_relation(&self, query: &str) -> bool {
        self.relation_patterns.iter().any(|re| re.is_match(query))
    }

    pub fn has_known_pair(&self, entities: &[String]) -> bool {
        self.known_pairs
            .iter()
            .any(|(a, b)| entities.contains(a) && entities.contains(b))
    }

    pub fn dictionary(&self) -> &EntityDictionary {
        &self.dictionary
    }
}
