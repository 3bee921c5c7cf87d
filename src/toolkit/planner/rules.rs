

use serde::{Deserialize, Serialize};

use crate::core::strategy::Strategy;
use crate::toolkit::router::QueryType;


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanCondition {
    /// Cross-domain enabled and the query names shared vocabulary or
    /// its entities span more than one domain.
    CrossDomain,
    /// Complex query with at least `min` entities.
    ComplexWithEntities { min: usize },
    /// At least two entities plus a relational pattern, or a known pair.
    RelationInference,
    QueryTypeIs { query_type: QueryType },
    Always,
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRule {
    pub condition: PlanCondition,
    pub strategy: Strategy,
}

impl PlanRule {
    pub fn new(condition: PlanCondition, strategy: Strategy) -> Self {
        Self { condition, strategy }
    }

    pub fn default_rules() -> Vec<PlanRule> {
        vec![
            PlanRule::new(PlanCondition::CrossDomain, Strategy::CrossType),
            PlanRule::new(PlanCondition::ComplexWithEntities { min: 3 }, Strategy::GraphGlobal),
            PlanRule::new(PlanCondition::RelationInference, Strategy::GraphLocal),
            PlanRule::new(
                PlanCondition::QueryTypeIs {
                    query_type: QueryType::Comparison,
                },
                Strategy::GraphLocal,
            ),
            PlanRule::new(
                PlanCondition::QueryTypeIs {
                    query_type: QueryType::PatternQuery,
                },
                Strategy::GraphLocal,
            ),
            PlanRule::new(
                PlanCondition::QueryTypeIs {
                    query_type: QueryType::BasicConcept,
                },
                Strategy::HybridVector,
            ),
        ]
    }
}
