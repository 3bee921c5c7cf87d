

pub mod answer;
pub mod graph;
pub mod orchestrator;
pub mod planner;
pub mod registry;
pub mod router;
pub mod search;

#[cfg(test)]
pub mod testing;


pub use answer::{Answer, AnswerComposer, AnswerRequest};
pub use orchestrator::{IndexHandle, IndexSummary, RetrievalOrchestrator, SearchOutcome, SearchRequest};
pub use registry::{Collaborators, ServiceRegistry};
