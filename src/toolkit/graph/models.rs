

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::models::{CollectionKey, Relation};


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub source_doc_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Every document the name appeared in, not just the first.
    #[serde(default)]
    pub documents: BTreeSet<String>,
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub entity_type: String,
    pub entity_names: Vec<String>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Community {
    /// Text matched against queries during global search.
    pub fn match_text(&self) -> String {
        format!("{} {}", self.summary, self.entity_type)
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub domain: String,
    pub category: String,
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub document_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeGraph {
    pub fn new(collection: &CollectionKey) -> Self {
        Self {
            domain: collection.domain.clone(),
            category: collection.category.clone(),
            entities: Vec::new(),
            relations: Vec::new(),
            document_count: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn collection(&self) -> CollectionKey {
        CollectionKey::new(self.domain.clone(), self.category.clone())
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }
}
