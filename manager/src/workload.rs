// File: manager/src/workload.rs

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::constants;
use crate::database::Database;
use crate::errors::OrchestratorResult;

/// One entry of the operational event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationalEvent {
    pub host_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
}

/// Activity histogram of a host. `daily_load[0]` is Sunday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadPattern {
    pub hourly_load: [u32; 24],
    pub daily_load: [u32; 7],
    pub peak_hours: Vec<u32>,
    pub low_activity_periods: Vec<u32>,
    pub event_count: u32,
}

impl WorkloadPattern {
    /// Mean events per hour of day
    pub fn hourly_mean(&self) -> f64 {
        self.event_count as f64 / 24.0
    }

    pub fn is_peak_hour(&self, hour: u32) -> bool {
        self.peak_hours.contains(&(hour % 24))
    }

    pub fn is_low_activity_hour(&self, hour: u32) -> bool {
        self.low_activity_periods.contains(&(hour % 24))
    }

    pub fn load_at(&self, hour: u32) -> u32 {
        self.hourly_load[(hour % 24) as usize]
    }
}

/// Bucket events by local hour and weekday and classify each hour against
/// the 24-hour mean.
pub fn analyze(events: &[OperationalEvent], timezone: Tz) -> WorkloadPattern {
    let mut hourly_load = [0u32; 24];
    let mut daily_load = [0u32; 7];

    for event in events {
        let local = event.occurred_at.with_timezone(&timezone);
        hourly_load[local.hour() as usize] += 1;
        daily_load[local.weekday().num_days_from_sunday() as usize] += 1;
    }

    let event_count: u32 = hourly_load.iter().sum();
    let mean = event_count as f64 / 24.0;
    let peak_threshold = mean * constants::workload::PEAK_FACTOR;
    let low_threshold = mean * constants::workload::LOW_FACTOR;

    let peak_hours = (0..24u32)
        .filter(|h| hourly_load[*h as usize] as f64 > peak_threshold)
        .collect();
    let low_activity_periods = (0..24u32)
        .filter(|h| (hourly_load[*h as usize] as f64) < low_threshold)
        .collect();

    WorkloadPattern {
        hourly_load,
        daily_load,
        peak_hours,
        low_activity_periods,
        event_count,
    }
}

/// Reads the event log and turns it into workload patterns
pub struct WorkloadAnalyzer {
    database: Arc<Database>,
    timezone: Tz,
    trailing_days: i64,
}

impl WorkloadAnalyzer {
    pub fn new(database: Arc<Database>, timezone: Tz, trailing_days: i64) -> Self {
        Self {
            database,
            timezone,
            trailing_days,
        }
    }

    pub async fn analyze_host(&self, host_id: &str, now: DateTime<Utc>) -> OrchestratorResult<WorkloadPattern> {
        let since = now - Duration::days(self.trailing_days);
        let events = self.database.events_for_host_since(host_id, since).await?;
        let pattern = analyze(&events, self.timezone);

        debug!(
            "Workload for {}: {} events, peaks {:?}, quiet hours {:?}",
            host_id, pattern.event_count, pattern.peak_hours, pattern.low_activity_periods
        );
        Ok(pattern)
    }
}

impl Default for WorkloadPattern {
    fn default() -> Self {
        analyze(&[], Tz::UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_at(year: i32, month: u32, day: u32, hour: u32) -> OperationalEvent {
        OperationalEvent {
            host_id: "h1".to_string(),
            event_type: "vm_migration".to_string(),
            occurred_at: Utc.with_ymd_and_hms(year, month, day, hour, 15, 0).unwrap(),
        }
    }

    #[test]
    fn empty_log_has_no_peaks_or_quiet_hours() {
        let pattern = analyze(&[], Tz::UTC);
        assert_eq!(pattern.event_count, 0);
        assert!(pattern.peak_hours.is_empty());
        assert!(pattern.low_activity_periods.is_empty());
    }

    #[test]
    fn busy_hours_are_peaks_and_idle_hours_are_quiet() {
        // 2024-03-04 is a Monday
        let mut events = Vec::new();
        for _ in 0..10 {
            events.push(event_at(2024, 3, 4, 14));
        }
        for hour in 8..20 {
            events.push(event_at(2024, 3, 4, hour));
        }

        let pattern = analyze(&events, Tz::UTC);
        assert_eq!(pattern.event_count, 22);
        assert_eq!(pattern.hourly_load[14], 11);
        assert_eq!(pattern.daily_load[1], 22);
        assert_eq!(pattern.peak_hours, vec![14]);
        // mean is under one event per hour so only empty hours are quiet
        assert!(pattern.low_activity_periods.contains(&3));
        assert!(!pattern.low_activity_periods.contains(&9));
    }

    #[test]
    fn buckets_use_the_configured_timezone() {
        // 23:15 UTC on Saturday is 01:15 Sunday in Berlin (CEST)
        let events = vec![event_at(2024, 6, 8, 23)];

        let utc = analyze(&events, Tz::UTC);
        assert_eq!(utc.hourly_load[23], 1);
        assert_eq!(utc.daily_load[6], 1);

        let berlin = analyze(&events, chrono_tz::Europe::Berlin);
        assert_eq!(berlin.hourly_load[1], 1);
        assert_eq!(berlin.daily_load[0], 1);
    }

    #[test]
    fn analysis_is_deterministic() {
        let events: Vec<_> = (0..48).map(|i| event_at(2024, 3, 1 + i / 24, i % 24)).collect();
        assert_eq!(analyze(&events, Tz::UTC), analyze(&events, Tz::UTC));
    }
}
