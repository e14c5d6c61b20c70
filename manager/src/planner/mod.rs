// File: manager/src/planner/mod.rs
pub mod engine;
pub mod grouping;
pub mod types;

pub use engine::{build_plan, PlanInput};
pub use types::{
    BatchEstimate, PlanConstraints, PlanPolicy, PlanRequest, PlanStatus, PlanType, RiskLevel,
    RollbackPlan, RollbackStrategy, RollbackTrigger, SafetyChecks, ServerGroup, TimeWindow,
    Timeline, UpdatePlan,
};
