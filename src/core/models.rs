

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};


#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionKey {
    pub domain: String,
    pub category: String,
}

impl CollectionKey {
    pub fn new(domain: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            category: category.into(),
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.category)
    }
}


/// Identity of a retrieved item across every source. Two results with equal
/// keys are the same logical item whatever engine produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResultKey {
    pub domain: String,
    pub category: String,
    pub id: String,
}

impl ResultKey {
    pub fn collection(&self) -> CollectionKey {
        CollectionKey::new(self.domain.clone(), self.category.clone())
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.domain, self.category, self.id)
    }
}


#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum KnowledgeLevel {
    Basic,
    #[default]
    Method,
    Advanced,
}

impl KnowledgeLevel {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default)]
    pub relation_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub domain: String,
    pub category: String,
    #[serde(default)]
    pub level: KnowledgeLevel,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl KnowledgeEntry {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        collection: &CollectionKey,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            domain: collection.domain.clone(),
            category: collection.category.clone(),
            level: KnowledgeLevel::default(),
            entities: Vec::new(),
            relations: Vec::new(),
            keywords: Vec::new(),
        }
    }

    pub fn collection(&self) -> CollectionKey {
        CollectionKey::new(self.domain.clone(), self.category.clone())
    }
}


#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provenance {
    #[default]
    Vector,
    Keyword,
    Graph,
    Shared,
    Cross,
    Hybrid,
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub title: String,
    pub domain: String,
    pub category: String,
    pub level: KnowledgeLevel,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl SearchResult {
    pub fn key(&self) -> ResultKey {
        ResultKey {
            domain: self.domain.clone(),
            category: self.category.clone(),
            id: self.id.clone(),
        }
    }

    #[must_use]
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}


/// Stable sort by descending score; equal scores keep encounter order.
pub fn sort_by_score_desc(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}
