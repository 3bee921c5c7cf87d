

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};


#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum QueryType {
    PalaceInquiry,
    StarInquiry,
    FortuneQuery,
    PatternQuery,
    BasicConcept,
    Comparison,
    #[default]
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
    pub query: String,
    pub query_type: QueryType,
    pub is_complex: bool,
    pub entities: Vec<String>,
}

impl QueryContext {
    pub fn general(query: &str) -> Self {
        Self {
            query: query.to_string(),
            query_type: QueryType::General,
            is_complex: false,
            entities: Vec::new(),
        }
    }
}
