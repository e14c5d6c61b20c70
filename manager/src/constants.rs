//! Central repository for orchestrator constants and magic numbers
//!
//! Constants are grouped by the subsystem that consumes them. Most of them are
//! defaults for values that can be overridden in `config/main.toml`.

use std::time::Duration;

/// Job queue defaults and limits
pub mod jobs {
    /// Priority assigned when the caller does not pass one (lower runs sooner)
    pub const DEFAULT_PRIORITY: i64 = 10;

    /// Retry budget for a newly created job
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Maximum number of jobs returned by a list query
    pub const LIST_LIMIT: i64 = 100;

    /// Interval between passes of the optional auto-retry supervisor
    pub const AUTO_RETRY_INTERVAL_SECONDS: u64 = 300;

    /// Longest accepted scheduling delay of a new job (one year)
    pub const MAX_DELAY_SECONDS: i64 = 365 * 24 * 3600;
}

/// Host run lifecycle constants
pub mod host_run {
    /// Error message recorded when an operator cancels a run
    pub const CANCELLED_BY_OPERATOR: &str = "cancelled by operator";

    /// Runs stuck in one state longer than this are reported by the watchdog
    pub const STUCK_RUN_THRESHOLD_MINUTES: i64 = 240;

    /// Upper bound of the configurable watchdog threshold (30 days)
    pub const MAX_STUCK_RUN_THRESHOLD_MINUTES: i64 = 30 * 24 * 60;

    /// Checks executed by the precheck job
    pub const PRECHECKS: &[&str] = &["connectivity", "disk_space", "backup_status"];

    /// Checks executed by the postcheck job
    pub const POSTCHECKS: &[&str] = &["service_status", "performance", "connectivity"];
}

/// Workload analysis thresholds
pub mod workload {
    /// Trailing window of operational events considered by the analyzer
    pub const TRAILING_DAYS: i64 = 30;

    pub const MAX_TRAILING_DAYS: i64 = 366;

    /// Hours with a count above `mean * PEAK_FACTOR` are peak hours
    pub const PEAK_FACTOR: f64 = 1.5;

    /// Hours with a count below `mean * LOW_FACTOR` are low-activity hours
    pub const LOW_FACTOR: f64 = 0.5;
}

/// Maintenance window predictor scoring
pub mod predictor {
    /// Number of days ahead that are scanned for candidate windows
    pub const HORIZON_DAYS: u32 = 14;

    pub const MAX_HORIZON_DAYS: u32 = 90;

    /// Longest update duration a window is predicted for (7 days)
    pub const MAX_UPDATE_DURATION_MINUTES: i64 = 7 * 24 * 60;

    /// Maximum recommendations returned per host
    pub const MAX_RECOMMENDATIONS: usize = 5;

    /// Candidates with confidence at or below this value are discarded
    pub const MIN_CONFIDENCE: i32 = 30;

    /// Start hours used when no low-activity hour qualifies
    pub const FALLBACK_START_HOURS: &[u32] = &[2, 3, 4];

    pub const BASE_CONFIDENCE: i32 = 70;
    pub const BASE_RISK: i32 = 30;

    pub const LOW_ACTIVITY_CONFIDENCE_BONUS: i32 = 20;
    pub const LOW_ACTIVITY_RISK_REDUCTION: i32 = 15;

    pub const PEAK_OVERLAP_CONFIDENCE_PENALTY: i32 = 25;
    pub const PEAK_OVERLAP_RISK_INCREASE: i32 = 20;

    pub const WEEKEND_CONFIDENCE_BONUS: i32 = 10;
    pub const WEEKEND_RISK_REDUCTION: i32 = 5;

    /// Hosts with at least this many VMs are treated as heavily loaded
    pub const HEAVY_VM_COUNT: u32 = 20;

    /// Hosts with at least this many VMs are treated as moderately loaded
    pub const MODERATE_VM_COUNT: u32 = 10;

    /// Maximum alternatives attached to a recommendation
    pub const MAX_ALTERNATIVES: usize = 2;
}

/// Update planner defaults
pub mod planner {
    /// Default number of server groups updated at the same time
    pub const MAX_CONCURRENT_UPDATES: u32 = 2;

    /// Delay between two consecutive batches
    pub const INTER_BATCH_DELAY_MINUTES: i64 = 30;

    /// Upper bound of the inter-batch delay (7 days)
    pub const MAX_INTER_BATCH_DELAY_MINUTES: i64 = 7 * 24 * 60;

    /// Average duration of a firmware update on one host
    pub const AVG_UPDATE_MINUTES_PER_HOST: i64 = 45;

    /// Hosts with at least this many VMs are high risk
    pub const HIGH_RISK_VM_COUNT: u32 = 20;

    /// Hosts with at least this many VMs are medium risk
    pub const MEDIUM_RISK_VM_COUNT: u32 = 5;

    /// Criticality weight of HA membership
    pub const HA_WEIGHT: f64 = 40.0;

    /// Criticality weight of each hosted VM
    pub const VM_WEIGHT: f64 = 2.0;

    /// Upper bound of the VM contribution to criticality
    pub const VM_WEIGHT_CAP: f64 = 50.0;

    /// Criticality penalty of a host whose readiness check failed
    pub const NOT_READY_PENALTY: f64 = 25.0;

    /// Criticality penalty of a host with a degraded readiness check
    pub const DEGRADED_PENALTY: f64 = 10.0;
}

/// Background task cadence
pub mod intervals {
    use super::Duration;

    /// Default tick of the plan executor
    pub const EXECUTOR_TICK: Duration = Duration::from_secs(5);

    /// Interval of the stuck-run watchdog report
    pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(600);
}

/// Alert delivery
pub mod alerts {
    /// Webhook request timeout
    pub const WEBHOOK_TIMEOUT_SECONDS: u64 = 10;
}

/// Default configuration values
pub mod defaults {
    pub const BIND_HOST: &str = "0.0.0.0";
    pub const BIND_PORT: u16 = 8095;
    pub const DATABASE_PATH: &str = "data/fleet.db";
    pub const TIMEZONE: &str = "UTC";
}
