// File: manager/src/predictor.rs
//
// Heuristic ranking of maintenance windows. Same pattern, constraints and
// clock always yield the same list.
//
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::config::PredictorSettings;
use crate::constants::predictor as scoring;
use crate::inventory::HostProfile;
use crate::workload::WorkloadPattern;

/// Local hours `[start, end)`; wraps past midnight when `start > end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    pub start: u32,
    pub end: u32,
}

impl HourRange {
    pub fn contains(&self, hour: u32) -> bool {
        let hour = hour % 24;
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionConstraints {
    #[serde(default)]
    pub blackout_dates: Vec<NaiveDate>,
    /// Empty means every day is acceptable
    #[serde(default)]
    pub preferred_days: Vec<Weekday>,
    #[serde(default)]
    pub critical_hours: Vec<HourRange>,
    pub horizon_days: u32,
    pub max_recommendations: usize,
    pub min_confidence: i32,
}

impl Default for PredictionConstraints {
    fn default() -> Self {
        Self {
            blackout_dates: Vec::new(),
            preferred_days: Vec::new(),
            critical_hours: Vec::new(),
            horizon_days: scoring::HORIZON_DAYS,
            max_recommendations: scoring::MAX_RECOMMENDATIONS,
            min_confidence: scoring::MIN_CONFIDENCE,
        }
    }
}

impl PredictionConstraints {
    pub fn from_settings(settings: &PredictorSettings) -> Self {
        Self {
            horizon_days: settings.horizon_days,
            max_recommendations: settings.max_recommendations,
            min_confidence: settings.min_confidence,
            ..Self::default()
        }
    }

    fn allows_date(&self, date: NaiveDate) -> bool {
        !self.blackout_dates.contains(&date)
            && (self.preferred_days.is_empty() || self.preferred_days.contains(&date.weekday()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadImpact {
    Minimal,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeWindow {
    pub suggested_start: DateTime<Utc>,
    pub suggested_end: DateTime<Utc>,
    pub confidence: u8,
    pub risk_score: u8,
    pub tradeoff: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindowRecommendation {
    pub server_id: String,
    pub suggested_start: DateTime<Utc>,
    pub suggested_end: DateTime<Utc>,
    pub confidence: u8,
    pub risk_score: u8,
    pub workload_impact: WorkloadImpact,
    pub rationale: Vec<String>,
    pub alternatives: Vec<AlternativeWindow>,
}

/// Rank candidate windows for one host over the constraint horizon.
pub fn predict(
    host: &HostProfile,
    pattern: &WorkloadPattern,
    duration_minutes: i64,
    constraints: &PredictionConstraints,
    timezone: Tz,
    now: DateTime<Utc>,
) -> Vec<MaintenanceWindowRecommendation> {
    let duration_minutes = duration_minutes.clamp(1, scoring::MAX_UPDATE_DURATION_MINUTES);
    let span_hours = ((duration_minutes + 59) / 60) as u32;
    let today = now.with_timezone(&timezone).date_naive();

    let mut quiet_starts: Vec<u32> = pattern
        .low_activity_periods
        .iter()
        .copied()
        .filter(|hour| !overlaps_critical(*hour, span_hours, constraints))
        .collect();
    let fallback = quiet_starts.is_empty();
    if fallback {
        quiet_starts = scoring::FALLBACK_START_HOURS.to_vec();
    }

    let mut recommendations = Vec::new();
    for offset in 0..constraints.horizon_days {
        let date = today + Duration::days(offset as i64);
        if !constraints.allows_date(date) {
            continue;
        }

        for hour in &quiet_starts {
            let Some(start) = local_start(date, *hour, timezone) else {
                continue;
            };
            if start <= now {
                continue;
            }
            let end = start + Duration::minutes(duration_minutes);

            let score = score_window(host, pattern, date, *hour, span_hours);
            if score.confidence <= constraints.min_confidence {
                continue;
            }

            let mut rationale = score.reasons;
            if fallback {
                rationale.push("No qualifying low-activity hour; using the early-morning band".to_string());
            }

            recommendations.push(MaintenanceWindowRecommendation {
                server_id: host.id.clone(),
                suggested_start: start,
                suggested_end: end,
                confidence: clamp(score.confidence),
                risk_score: clamp(score.risk),
                workload_impact: workload_impact(pattern, *hour, span_hours),
                rationale,
                alternatives: alternatives(
                    pattern,
                    date,
                    *hour,
                    span_hours,
                    duration_minutes,
                    constraints,
                    timezone,
                    now,
                    today,
                ),
            });
        }
    }

    recommendations.sort_by(rank);
    recommendations.truncate(constraints.max_recommendations);
    recommendations
}

/// Confidence descending, then risk ascending, then earliest start
fn rank(a: &MaintenanceWindowRecommendation, b: &MaintenanceWindowRecommendation) -> Ordering {
    b.confidence
        .cmp(&a.confidence)
        .then(a.risk_score.cmp(&b.risk_score))
        .then(a.suggested_start.cmp(&b.suggested_start))
}

struct WindowScore {
    confidence: i32,
    risk: i32,
    reasons: Vec<String>,
}

fn score_window(
    host: &HostProfile,
    pattern: &WorkloadPattern,
    date: NaiveDate,
    hour: u32,
    span_hours: u32,
) -> WindowScore {
    let mut score = WindowScore {
        confidence: scoring::BASE_CONFIDENCE,
        risk: scoring::BASE_RISK,
        reasons: Vec::new(),
    };

    if pattern.is_low_activity_hour(hour) {
        score.confidence += scoring::LOW_ACTIVITY_CONFIDENCE_BONUS;
        score.risk -= scoring::LOW_ACTIVITY_RISK_REDUCTION;
        score.reasons.push(format!("{:02}:00 is a historically low-activity hour", hour));
    }

    if overlaps_peak(pattern, hour, span_hours) {
        score.confidence -= scoring::PEAK_OVERLAP_CONFIDENCE_PENALTY;
        score.risk += scoring::PEAK_OVERLAP_RISK_INCREASE;
        score.reasons.push("Window overlaps a peak activity hour".to_string());
    }

    if is_weekend(date) {
        score.confidence += scoring::WEEKEND_CONFIDENCE_BONUS;
        score.risk -= scoring::WEEKEND_RISK_REDUCTION;
        score.reasons.push(format!("{} falls on a weekend", date));
    }

    if host.vm_count >= scoring::HEAVY_VM_COUNT {
        score.confidence -= 10;
        score.risk += 15;
        score.reasons.push(format!("Host runs {} VMs", host.vm_count));
    } else if host.vm_count >= scoring::MODERATE_VM_COUNT {
        score.confidence -= 5;
        score.risk += 10;
        score.reasons.push(format!("Host runs {} VMs", host.vm_count));
    } else if host.vm_count == 0 {
        score.confidence += 5;
        score.risk -= 5;
        score.reasons.push("Host runs no VMs".to_string());
    }

    if host.ha_enabled {
        score.confidence += 5;
        score.risk -= 10;
        score.reasons.push("HA cluster can absorb the host's workload".to_string());
    }

    score
}

/// Neighbouring days at the same hour, scored on time signals only
#[allow(clippy::too_many_arguments)]
fn alternatives(
    pattern: &WorkloadPattern,
    date: NaiveDate,
    hour: u32,
    span_hours: u32,
    duration_minutes: i64,
    constraints: &PredictionConstraints,
    timezone: Tz,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> Vec<AlternativeWindow> {
    let last_day = today + Duration::days(constraints.horizon_days as i64);
    let mut result = Vec::new();

    for (shift, label) in [(-1i64, "One day earlier"), (1, "One day later")] {
        let alt_date = date + Duration::days(shift);
        if alt_date < today || alt_date >= last_day || constraints.blackout_dates.contains(&alt_date) {
            continue;
        }
        let Some(start) = local_start(alt_date, hour, timezone) else {
            continue;
        };
        if start <= now {
            continue;
        }

        let mut confidence = scoring::BASE_CONFIDENCE;
        let mut risk = scoring::BASE_RISK;
        if pattern.is_low_activity_hour(hour) {
            confidence += scoring::LOW_ACTIVITY_CONFIDENCE_BONUS;
            risk -= scoring::LOW_ACTIVITY_RISK_REDUCTION;
        }
        if overlaps_peak(pattern, hour, span_hours) {
            confidence -= scoring::PEAK_OVERLAP_CONFIDENCE_PENALTY;
            risk += scoring::PEAK_OVERLAP_RISK_INCREASE;
        }
        let weekend = is_weekend(alt_date);
        if weekend {
            confidence += scoring::WEEKEND_CONFIDENCE_BONUS;
            risk -= scoring::WEEKEND_RISK_REDUCTION;
        }

        let mut tradeoff = format!("{} ({})", label, alt_date.weekday());
        if weekend != is_weekend(date) {
            tradeoff.push_str(if weekend {
                ", weekend staffing"
            } else {
                ", business day traffic"
            });
        }
        if !constraints.preferred_days.is_empty() && !constraints.preferred_days.contains(&alt_date.weekday()) {
            tradeoff.push_str(", outside preferred days");
        }

        result.push(AlternativeWindow {
            suggested_start: start,
            suggested_end: start + Duration::minutes(duration_minutes),
            confidence: clamp(confidence),
            risk_score: clamp(risk),
            tradeoff,
        });
        if result.len() == scoring::MAX_ALTERNATIVES {
            break;
        }
    }

    result
}

fn workload_impact(pattern: &WorkloadPattern, hour: u32, span_hours: u32) -> WorkloadImpact {
    let mean = pattern.hourly_mean();
    if mean == 0.0 {
        return WorkloadImpact::Minimal;
    }

    let covered: u32 = (0..span_hours).map(|i| pattern.load_at(hour + i)).sum();
    let ratio = covered as f64 / span_hours as f64 / mean;
    if ratio < 0.25 {
        WorkloadImpact::Minimal
    } else if ratio < 0.75 {
        WorkloadImpact::Low
    } else if ratio < 1.5 {
        WorkloadImpact::Medium
    } else {
        WorkloadImpact::High
    }
}

fn overlaps_peak(pattern: &WorkloadPattern, hour: u32, span_hours: u32) -> bool {
    (0..span_hours).any(|i| pattern.is_peak_hour(hour + i))
}

fn overlaps_critical(hour: u32, span_hours: u32, constraints: &PredictionConstraints) -> bool {
    (0..span_hours).any(|i| constraints.critical_hours.iter().any(|range| range.contains(hour + i)))
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Earliest instant of a local hour; `None` when DST skips it
fn local_start(date: NaiveDate, hour: u32, timezone: Tz) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(hour, 0, 0)?;
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

fn clamp(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}
