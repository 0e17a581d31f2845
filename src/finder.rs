//! Newest image matching an owner filter and name pattern.

use crate::age::{self, AgeAssessment};
use crate::config::ComplianceThreshold;
use crate::error::Error;
use crate::filter::ImageFilter;
use crate::inventory::Image;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestImage {
    pub image: Image,
    pub assessment: AgeAssessment,
    pub threshold_days: ComplianceThreshold,
    /// How many images matched the filter.
    pub candidates: usize,
}

/// Select the newest image that passes `filter`.
///
/// Images created at the same instant are ordered by id, and the greatest id
/// wins, so repeated calls over the same input always pick the same image.
pub fn find_latest(
    images: &[Image],
    filter: &ImageFilter,
    now: DateTime<Utc>,
    threshold: ComplianceThreshold,
) -> Result<LatestImage, Error> {
    let mut candidates = 0usize;
    let latest = images
        .iter()
        .filter(|img| filter.matches(img))
        .inspect(|_| candidates += 1)
        .max_by(|a, b| {
            a.creation_date
                .cmp(&b.creation_date)
                .then_with(|| a.image_id.cmp(&b.image_id))
        })
        .ok_or_else(|| Error::NotFound {
            owner: filter.owner.to_string(),
            pattern: filter.name.to_string(),
        })?;

    let assessment = age::assess(&latest.image_id, latest.creation_date, now, threshold);

    Ok(LatestImage {
        image: latest.clone(),
        assessment,
        threshold_days: threshold,
        candidates,
    })
}
