// File: manager/src/host_run/mod.rs
pub mod manager;
pub mod state;
pub mod types;

pub use manager::HostRunManager;
pub use state::HostRunState;
pub use types::{
    HostRun, HostRunContext, HostRunStatus, HostRunView, StartRunRequest, StepResult,
};
