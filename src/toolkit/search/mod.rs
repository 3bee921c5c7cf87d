

pub mod cache;
pub mod cross_domain;
pub mod fusion;
pub mod hybrid;

pub use cache::{SearchCache, SearchCacheStats};
pub use cross_domain::{CrossDomainRetriever, merge_first_writer_wins};
pub use fusion::{RankedList, ScoreFusion};
pub use hybrid::HybridRetriever;
