

use std::collections::HashSet;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityGroup {
    pub name: String,
    pub domain: String,
    pub keywords: Vec<String>,
}

impl EntityGroup {
    fn new(name: &str, domain: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

lazy_static! {
    pub static ref DEFAULT_ENTITY_GROUPS: Vec<EntityGroup> = vec![
        EntityGroup::new("ziwei_stars", "ziwei", &[
            "紫微", "天机", "太阳", "武曲", "天同", "廉贞", "天府", "太阴", "贪狼", "巨门",
            "天相", "天梁", "七杀", "破军", "文昌", "文曲", "左辅", "右弼", "天魁", "天钺",
            "禄存", "天马", "火星", "铃星",
        ]),
        EntityGroup::new("ziwei_palaces", "ziwei", &[
            "命宫", "兄弟宫", "夫妻宫", "子女宫", "财帛宫", "疾厄宫", "迁移宫", "交友宫",
            "官禄宫", "田宅宫", "福德宫", "父母宫",
        ]),
        EntityGroup::new("ziwei_transformations", "ziwei", &["化禄", "化权", "化科", "化忌"]),
        EntityGroup::new("bazi_elements", "bazi", &[
            "日主", "用神", "喜神", "忌神", "闲神", "正官", "七杀", "正财", "偏财", "正印",
            "偏印", "比肩", "劫财", "食神", "伤官",
        ]),
        EntityGroup::new("bazi_concepts", "bazi", &["身强", "身弱", "从格", "化格", "调候", "通关"]),
        EntityGroup::new("shared_concepts", "shared", &[
            "五行", "金", "木", "水", "火", "土", "天干", "地支", "阴阳", "干支", "六合", "三合",
            "大运", "流年", "太岁", "岁运",
        ]),
        EntityGroup::new("qimen_elements", "qimen", &[
            "九星", "八门", "八神", "值符", "值使", "天蓬", "天任", "天冲", "天辅", "天英",
            "天芮", "天柱", "天心", "开门", "休门", "生门", "伤门", "杜门", "景门", "死门",
            "惊门",
        ]),
    ];

    pub static ref DEFAULT_SEMANTIC_VOCABULARY: Vec<(String, Vec<String>)> = {
        let table: &[(&str, &[&str])] = &[
            ("星曜", &[
                "紫微", "天机", "太阳", "武曲", "天同", "廉贞", "天府", "太阴", "贪狼", "巨门",
                "天相", "天梁", "七杀", "破军",
            ]),
            ("宫位", &[
                "命宫", "兄弟宫", "夫妻宫", "子女宫", "财帛宫", "疾厄宫", "迁移宫", "交友宫",
                "官禄宫", "田宅宫", "福德宫", "父母宫",
            ]),
            ("四化", &["化禄", "化权", "化科", "化忌"]),
            ("格局", &["紫府同宫格", "杀破狼格", "火贪格", "铃贪格", "府相朝垣格", "日丽中天格"]),
            ("十神", &["正官", "七杀", "正财", "偏财", "正印", "偏印", "比肩", "劫财", "食神", "伤官"]),
            ("用神", &["用神", "喜神", "忌神", "调候"]),
            ("五行", &["金", "木", "水", "火", "土"]),
            ("天干", &["甲", "乙", "丙", "丁", "戊", "己", "庚", "辛", "壬", "癸"]),
            ("地支", &["子", "丑", "寅", "卯", "辰", "巳", "午", "未", "申", "酉", "戌", "亥"]),
        ];
        table
            .iter()
            .map(|(ty, terms)| (ty.to_string(), terms.iter().map(|t| t.to_string()).collect()))
            .collect()
    };
}


/// Domain-tagged vocabulary used for query entity extraction.
#[derive(Debug, Clone)]
pub struct EntityDictionary {
    groups: Vec<EntityGroup>,
}

impl EntityDictionary {
    pub fn new(groups: Vec<EntityGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[EntityGroup] {
        &self.groups
    }

    /// Exact substring matches in group order, first occurrence kept.
    pub fn extract(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.groups
            .iter()
            .flat_map(|g| g.keywords.iter())
            .filter(|k| !k.is_empty() && query.contains(k.as_str()))
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect()
    }

    /// Domain of the first group listing `entity`.
    pub fn domain_of(&self, entity: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.keywords.iter().any(|k| k == entity))
            .map(|g| g.domain.as_str())
    }

    /// Distinct domains of the given entities, in first-seen order.
    pub fn domains_of(&self, entities: &[String]) -> Vec<String> {
        let mut domains: Vec<String> = Vec::new();
        for domain in entities.iter().filter_map(|e| self.domain_of(e)) {
            if !domains.iter().any(|d| d == domain) {
                domains.push(domain.to_string());
            }
        }
        domains
    }
}

impl Default for EntityDictionary {
    fn default() -> Self {
        Self::new(DEFAULT_ENTITY_GROUPS.clone())
    }
}


/// Semantic types for the graph builder's dictionary pass.
#[derive(Debug, Clone)]
pub struct SemanticVocabulary {
    types: Vec<(String, Vec<String>)>,
}

impl SemanticVocabulary {
    pub fn new(types: Vec<(String, Vec<String>)>) -> Self {
        Self { types }
    }

    /// `(term, semantic type)` for every vocabulary term found in `text`.
    /// A term listed under several types is reported once, under the first.
    pub fn scan(&self, text: &str) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for (ty, terms) in &self.types {
            for term in terms {
                if text.contains(term.as_str()) && seen.insert(term.as_str()) {
                    found.push((term.clone(), ty.clone()));
                }
            }
        }
        found
    }

    pub fn type_of(&self, term: &str) -> Option<&str> {
        self.types
            .iter()
            .find(|(_, terms)| terms.iter().any(|t| t == term))
            .map(|(ty, _)| ty.as_str())
    }
}

impl Default for SemanticVocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_SEMANTIC_VOCABULARY.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_keeps_group_order_and_dedups() {
        let dict = EntityDictionary::default();
        let entities = dict.extract("七杀在命宫, 七杀遇紫微");
        // 七杀 appears in both ziwei_stars and bazi_elements
        assert_eq!(entities, vec!["紫微", "七杀", "命宫"]);
    }

    #[test]
    fn test_domains_of() {
        let dict = EntityDictionary::default();
        let domains = dict.domains_of(&["紫微".to_string(), "五行".to_string(), "命宫".to_string()]);
        assert_eq!(domains, vec!["ziwei", "shared"]);
        assert_eq!(dict.domain_of("七杀"), Some("ziwei"));
        assert_eq!(dict.domain_of("不存在"), None);
    }

    #[test]
    fn test_semantic_scan() {
        let vocab = SemanticVocabulary::default();
        let found = vocab.scan("紫微化禄入命宫");
        assert!(found.contains(&("紫微".to_string(), "星曜".to_string())));
        assert!(found.contains(&("化禄".to_string(), "四化".to_string())));
        assert!(found.contains(&("命宫".to_string(), "宫位".to_string())));
        assert_eq!(vocab.type_of("七杀"), Some("星曜"));
    }
}
