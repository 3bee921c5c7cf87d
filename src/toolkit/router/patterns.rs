

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use super::dictionary::{DEFAULT_ENTITY_GROUPS, EntityGroup};
use super::models::QueryType;

lazy_static! {
    /// Evaluated top to bottom; the first rule with a matching pattern wins.
    pub static ref INTENT_PATTERNS: Vec<(QueryType, Vec<&'static str>)> = vec![
        (QueryType::PalaceInquiry, vec![
            "宫", "命宫", "兄弟宫", "夫妻宫", "子女宫", "财帛宫", "疾厄宫", "迁移宫", "交友宫",
            "官禄宫", "田宅宫", "福德宫", "父母宫",
        ]),
        (QueryType::StarInquiry, vec![
            "星", "紫微", "天机", "太阳", "武曲", "天同", "廉贞", "天府", "太阴", "贪狼", "巨门",
            "天相", "天梁", "七杀", "破军",
        ]),
        (QueryType::FortuneQuery, vec!["运势", "财运", "事业", "感情", "健康", "桃花", "贵人", "小人"]),
        (QueryType::PatternQuery, vec![
            "格局", "成.*格", "什么.*格", "格", "紫府同宫", "杀破狼格", "火贪格", "铃贪格",
        ]),
        (QueryType::BasicConcept, vec!["什么是", "是什么", "解释", "意思", "如何", "怎么"]),
        (QueryType::Comparison, vec!["和.*哪个", "比较", "区别", "还是", "相比"]),
    ];

    pub static ref COMPLEX_PATTERNS: Vec<&'static str> = vec![
        "比较", "关系", "如何.*影响", "综合.*分析", "未来.*趋势", "和.*哪个", "还是", "原因",
        "为什么", "应该", "可以.*同时",
    ];

    pub static ref RELATION_PATTERNS: Vec<&'static str> = vec![
        "在.*宫", "与.*关系", "影响", "配合", "组合", "同时", "一起", "配",
    ];

    pub static ref KNOWN_PAIRS: Vec<(&'static str, &'static str)> = vec![
        ("紫微", "天府"),
        ("紫微", "天机"),
        ("太阳", "太阴"),
        ("武曲", "贪狼"),
        ("廉贞", "七杀"),
        ("命宫", "官禄宫"),
        ("命宫", "财帛宫"),
    ];
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRule {
    pub query_type: QueryType,
    pub patterns: Vec<String>,
}


/// Data-driven routing tables. Rule order is part of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingRules {
    pub intent_rules: Vec<IntentRule>,
    pub complex_patterns: Vec<String>,
    pub relation_patterns: Vec<String>,
    pub known_pairs: Vec<(String, String)>,
    pub entity_groups: Vec<EntityGroup>,
}

fn owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            intent_rules: INTENT_PATTERNS
                .iter()
                .map(|(query_type, patterns)| IntentRule {
                    query_type: *query_type,
                    patterns: owned(patterns),
                })
                .collect(),
            complex_patterns: owned(&COMPLEX_PATTERNS),
            relation_patterns: owned(&RELATION_PATTERNS),
            known_pairs: KNOWN_PAIRS
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            entity_groups: DEFAULT_ENTITY_GROUPS.clone(),
        }
    }
}
