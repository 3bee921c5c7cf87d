

use std::collections::HashMap;

use crate::core::models::{Provenance, ResultKey, SearchResult, sort_by_score_desc};


/// One source's ranked list plus the weight applied to its raw scores.
#[derive(Debug, Clone)]
pub struct RankedList {
    pub name: &'static str,
    pub weight: f64,
    pub results: Vec<SearchResult>,
}

impl RankedList {
    pub fn new(name: &'static str, weight: f64, results: Vec<SearchResult>) -> Self {
        Self { name, weight, results }
    }
}


/// Weighted max fusion keyed on [`ResultKey`].
#[derive(Debug, Clone, Copy)]
pub struct ScoreFusion;

impl ScoreFusion {
    /// Each result scores `raw * weight`; a key seen in several lists keeps the
    /// maximum. Output is sorted descending with ties in encounter order.
    ///
    /// Fused scores do not depend on list order, but the relative order of
    /// equal-scored results from different lists does. Callers pass lists in
    /// a fixed order (vector, then keyword).
    pub fn fuse(lists: &[RankedList]) -> Vec<SearchResult> {
        let mut slots: HashMap<ResultKey, usize> = HashMap::new();
        let mut fused: Vec<SearchResult> = Vec::new();

        for list in lists {
            for result in &list.results {
                let weighted = result.score * list.weight;
                match slots.get(&result.key()) {
                    Some(&i) => {
                        if weighted > fused[i].score {
                            fused[i].score = weighted;
                        }
                    }
                    None => {
                        slots.insert(result.key(), fused.len());
                        fused.push(
                            result
                                .clone()
                                .with_score(weighted)
                                .with_provenance(Provenance::Hybrid),
                        );
                    }
                }
            }
        }

        sort_by_score_desc(&mut fused);
        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::KnowledgeLevel;

    fn hit(id: &str, score: f64, provenance: Provenance) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            content: format!("doc {}", id),
            score,
            title: id.to_string(),
            domain: "ziwei".to_string(),
            category: "star".to_string(),
            level: KnowledgeLevel::Method,
            provenance,
            distance: None,
        }
    }

    #[test]
    fn test_max_not_sum() {
        let vector = RankedList::new("vector", 0.6, vec![hit("X", 0.9, Provenance::Vector)]);
        let keyword = RankedList::new("keyword", 0.4, vec![hit("X", 0.5, Provenance::Keyword)]);

        let fused = ScoreFusion::fuse(&[vector, keyword]);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 0.54).abs() < 1e-9);
        assert_eq!(fused[0].provenance, Provenance::Hybrid);
    }

    #[test]
    fn test_order_independent() {
        let vector = RankedList::new(
            "vector",
            0.6,
            vec![hit("a", 0.9, Provenance::Vector), hit("b", 0.2, Provenance::Vector)],
        );
        let keyword = RankedList::new(
            "keyword",
            0.4,
            vec![hit("b", 3.0, Provenance::Keyword), hit("c", 1.0, Provenance::Keyword)],
        );

        let forward = ScoreFusion::fuse(&[vector.clone(), keyword.clone()]);
        let backward = ScoreFusion::fuse(&[keyword, vector]);

        let ranking = |r: &[SearchResult]| r.iter().map(|x| (x.id.clone(), x.score)).collect::<Vec<_>>();
        assert_eq!(ranking(&forward), ranking(&backward));
        assert_eq!(forward[0].id, "b");
    }

    #[test]
    fn test_ties_keep_encounter_order() {
        let list = RankedList::new(
            "vector",
            1.0,
            vec![hit("first", 0.5, Provenance::Vector), hit("second", 0.5, Provenance::Vector)],
        );
        let fused = ScoreFusion::fuse(&[list]);
        assert_eq!(fused[0].id, "first");
        assert_eq!(fused[1].id, "second");
    }

    #[test]
    fn test_tied_scores_follow_list_order() {
        let vector = RankedList::new("vector", 0.5, vec![hit("v", 0.8, Provenance::Vector)]);
        let keyword = RankedList::new("keyword", 0.4, vec![hit("k", 1.0, Provenance::Keyword)]);

        let forward = ScoreFusion::fuse(&[vector.clone(), keyword.clone()]);
        let backward = ScoreFusion::fuse(&[keyword, vector]);

        let scores = |r: &[SearchResult]| {
            let mut s: Vec<(String, f64)> = r.iter().map(|x| (x.id.clone(), x.score)).collect();
            s.sort_by(|a, b| a.0.cmp(&b.0));
            s
        };
        assert_eq!(scores(&forward), scores(&backward));
        assert_eq!(forward[0].id, "v");
        assert_eq!(backward[0].id, "k");
    }

    #[test]
    fn test_different_collections_are_distinct() {
        let mut other = hit("X", 0.5, Provenance::Vector);
        other.category = "palace".to_string();
        let list = RankedList::new("vector", 1.0, vec![hit("X", 0.5, Provenance::Vector), other]);
        assert_eq!(ScoreFusion::fuse(&[list]).len(), 2);
    }
}
