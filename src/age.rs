//! Image age against the rotation threshold.

use crate::config::ComplianceThreshold;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Age of one image at the time of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeAssessment {
    pub id: String,
    pub created: DateTime<Utc>,
    /// Whole days since creation; never negative.
    pub age_days: u32,
    pub compliant: bool,
}

/// Compute the age of `created` at `now` in whole days, rounded down.
///
/// A creation time in the future (clock skew) counts as zero days old.
pub fn assess(
    id: impl Into<String>,
    created: DateTime<Utc>,
    now: DateTime<Utc>,
    threshold: ComplianceThreshold,
) -> AgeAssessment {
    let age_days = age_in_days(created, now);
    AgeAssessment {
        id: id.into(),
        created,
        age_days,
        compliant: age_days <= threshold.as_days(),
    }
}

pub fn age_in_days(created: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let days = (now - created).num_days();
    u32::try_from(days.max(0)).unwrap_or(u32::MAX)
}
