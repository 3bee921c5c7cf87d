

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};
use tracing::warn;

use super::error::RagError;


#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    EnumString,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Strategy {
    #[default]
    HybridVector,
    GraphLocal,
    GraphGlobal,
    CrossType,
}

impl Strategy {
    pub fn try_parse(s: &str) -> Result<Self, RagError> {
        s.trim()
            .parse::<Self>()
            .map_err(|_| RagError::UnknownStrategy(s.to_string()))
    }

    /// Lenient parse: anything unrecognised becomes `HybridVector`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        Self::try_parse(s).unwrap_or_else(|e| {
            warn!("{}, falling back to hybrid_vector", e);
            Self::HybridVector
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::HybridVector => "Vector + BM25 fusion, reranked",
            Self::GraphLocal => "Entity-neighbourhood graph search",
            Self::GraphGlobal => "Community-summary graph search",
            Self::CrossType => "Primary domain plus discounted shared/other domains",
        }
    }

    #[must_use]
    pub fn estimate_cost(&self) -> StrategyCost {
        match self {
            Self::HybridVector => StrategyCost {
                embedding_calls: 1,
                graph_calls: 0,
                reranker_calls: 1,
                latency_tier: LatencyTier::Fast,
            },
            Self::GraphLocal => StrategyCost {
                embedding_calls: 1,
                graph_calls: 1,
                reranker_calls: 1,
                latency_tier: LatencyTier::Medium,
            },
            Self::GraphGlobal => StrategyCost {
                embedding_calls: 1,
                graph_calls: 2,
                reranker_calls: 1,
                latency_tier: LatencyTier::Slow,
            },
            Self::CrossType => StrategyCost {
                embedding_calls: 2,
                graph_calls: 0,
                reranker_calls: 1,
                latency_tier: LatencyTier::Medium,
            },
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyTier {
    Fast,
    Medium,
    Slow,
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyCost {
    pub embedding_calls: u32,
    pub graph_calls: u32,
    pub reranker_calls: u32,
    pub latency_tier: LatencyTier,
}
