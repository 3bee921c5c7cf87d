

pub mod classifier;
pub mod dictionary;
pub mod models;
pub mod patterns;

pub use classifier::QueryClassifier;
pub use dictionary::{EntityDictionary, EntityGroup, SemanticVocabulary};
pub use models::{QueryContext, QueryType};
pub use patterns::{IntentRule, RoutingRules};
