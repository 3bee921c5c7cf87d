

#[allow(clippy::module_inception)]
pub mod planner;
pub mod rules;

pub use planner::StrategyPlanner;
pub use rules::{PlanCondition, PlanRule};
