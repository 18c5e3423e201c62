// Execution Planning Module
// Plan types, progress events and the planner that builds them

pub mod events;
pub mod plan;
pub mod planner;

// Re-export key types
pub use events::{plan_channel, NullReporter, PlanEvent, PlanReceiver, PlanReporter, PlanSender};
pub use plan::{ExecutionPlan, PlanWarning, PlannedJob, PlannedStep};
pub use planner::ExecutionPlanner;
