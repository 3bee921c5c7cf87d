

use std::sync::Arc;

use tracing::debug;

use super::rules::{PlanCondition, PlanRule};
use crate::core::config::RagConfig;
use crate::core::strategy::Strategy;
use crate::toolkit::router::{QueryClassifier, QueryContext};


pub struct StrategyPlanner {
    rules: Vec<PlanRule>,
    classifier: Arc<QueryClassifier>,
    shared_concepts: Vec<String>,
}

impl StrategyPlanner {
    pub fn new(rules: Vec<PlanRule>, classifier: Arc<QueryClassifier>, shared_concepts: Vec<String>) -> Self {
        Self {
            rules,
            classifier,
            shared_concepts,
        }
    }

    pub fn from_config(config: &RagConfig, classifier: Arc<QueryClassifier>) -> Self {
        Self::new(
            config.planner_rules.clone(),
            classifier,
            config.shared_concepts.clone(),
        )
    }

    /// First matching rule wins; with no match the plan is `HybridVector`.
    pub fn plan(&self, query: &str, ctx: &QueryContext, primary_domain: &str, cross_enabled: bool) -> Strategy {
        let strategy = self
            .rules
            .iter()
            .find(|rule| self.holds(&rule.condition, query, ctx, cross_enabled))
            .map_or(Strategy::HybridVector, |rule| rule.strategy);

        debug!(
            "Planned {} for {} query in '{}' ({} entities, complex={})",
            strategy,
            ctx.query_type.as_str(),
            primary_domain,
            ctx.entities.len(),
            ctx.is_complex
        );
        strategy
    }

    fn holds(&self, condition: &PlanCondition, query: &str, ctx: &QueryContext, cross_enabled: bool) -> bool {
        match condition {
            PlanCondition::CrossDomain => cross_enabled && self.needs_cross_domain(query, ctx),
            PlanCondition::ComplexWithEntities { min } => ctx.is_complex && ctx.entities.len() >= *min,
            PlanCondition::RelationInference => {
                (ctx.entities.len() >= 2 && self.classifier.matches_relation(query))
                    || self.classifier.has_known_pair(&ctx.entities)
            }
            PlanCondition::QueryTypeIs { query_type } => ctx.query_type == *query_type,
            PlanCondition::Always => true,
        }
    }

    pub fn needs_cross_domain(&self, query: &str, ctx: &QueryContext) -> bool {
        self.mentions_shared_concept(query)
            || self.classifier.dictionary().domains_of(&ctx.entities).len() > 1
    }

    pub fn mentions_shared_concept(&self, query: &str) -> bool {
        self.shared_concepts.iter().any(|c| query.contains(c.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::router::{QueryType, RoutingRules};
    use strum::IntoEnumIterator;

    fn planner() -> StrategyPlanner {
        let config = RagConfig::default();
        let classifier = Arc::new(QueryClassifier::new(&RoutingRules::default(), 50, 2).unwrap());
        StrategyPlanner::from_config(&config, classifier)
    }

    fn ctx(query_type: QueryType, is_complex: bool, entities: &[&str]) -> QueryContext {
        QueryContext {
            query: String::new(),
            query_type,
            is_complex,
            entities: entities.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn test_basic_concept_without_cross_domain() {
        let p = planner();
        let c = p.classifier.classify("什么是五行?");
        assert_eq!(p.plan("什么是五行?", &c, "ziwei", false), Strategy::HybridVector);
        assert_eq!(p.plan("什么是五行?", &c, "ziwei", true), Strategy::CrossType);
    }

    #[test]
    fn test_entities_spanning_domains_go_cross() {
        let p = planner();
        let c = ctx(QueryType::General, false, &["紫微", "正官"]);
        assert_eq!(p.plan("紫微 正官", &c, "ziwei", true), Strategy::CrossType);
        assert_eq!(p.plan("紫微 正官", &c, "ziwei", false), Strategy::HybridVector);
    }

    #[test]
    fn test_complex_with_many_entities_goes_global() {
        let p = planner();
        let c = ctx(QueryType::StarInquiry, true, &["紫微", "天府", "武曲"]);
        assert_eq!(p.plan("紫微天府武曲", &c, "ziwei", true), Strategy::GraphGlobal);
    }

    #[test]
    fn test_known_pair_goes_local() {
        let p = planner();
        let c = ctx(QueryType::StarInquiry, false, &["紫微", "天府"]);
        assert_eq!(p.plan("紫微天府", &c, "ziwei", true), Strategy::GraphLocal);
    }

    #[test]
    fn test_relation_shape_needs_two_entities() {
        let p = planner();
        let one = ctx(QueryType::General, false, &["太阳"]);
        assert_eq!(p.plan("太阳在夫妻宫", &one, "ziwei", false), Strategy::HybridVector);
        let two = ctx(QueryType::General, false, &["太阳", "夫妻宫"]);
        assert_eq!(p.plan("太阳在夫妻宫", &two, "ziwei", false), Strategy::GraphLocal);
    }

    #[test]
    fn test_type_rules() {
        let p = planner();
        assert_eq!(
            p.plan("x", &ctx(QueryType::Comparison, false, &[]), "ziwei", false),
            Strategy::GraphLocal
        );
        assert_eq!(
            p.plan("x", &ctx(QueryType::PatternQuery, false, &[]), "ziwei", false),
            Strategy::GraphLocal
        );
        assert_eq!(
            p.plan("x", &ctx(QueryType::FortuneQuery, false, &[]), "ziwei", false),
            Strategy::HybridVector
        );
    }

    #[test]
    fn test_planner_is_total() {
        let p = planner();
        let empty = StrategyPlanner::new(Vec::new(), Arc::clone(&p.classifier), Vec::new());
        for query_type in QueryType::iter() {
            for is_complex in [false, true] {
                for entities in [&[][..], &["紫微"][..], &["紫微", "天府", "五行"][..]] {
                    let c = ctx(query_type, is_complex, entities);
                    let planned = p.plan("查询", &c, "ziwei", true);
                    assert!(Strategy::iter().any(|s| s == planned));
                    assert_eq!(empty.plan("查询", &c, "ziwei", true), Strategy::HybridVector);
                }
            }
        }
    }
}
