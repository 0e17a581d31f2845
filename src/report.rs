//! Fleet report: instances joined to the images they were launched from.

use crate::age::{self, AgeAssessment};
use crate::config::ComplianceThreshold;
use crate::inventory::{Image, Instance};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Image details for an instance row, or a marker that the image could not
/// be found (deregistered or not shared with this account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstanceImage {
    Resolved { image_name: String, age_days: u32, compliant: bool },
    Unresolvable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceRow {
    pub instance_id: String,
    pub instance_type: String,
    pub state: String,
    pub launch_time: Option<DateTime<Utc>>,
    pub image_id: String,
    pub image: InstanceImage,
}

impl InstanceRow {
    pub fn is_resolved(&self) -> bool {
        matches!(self.image, InstanceImage::Resolved { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRow {
    pub image_id: String,
    pub name: String,
    pub created: DateTime<Utc>,
    pub age_days: u32,
    pub compliant: bool,
    /// Number of instances launched from this image.
    pub instance_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub threshold_days: ComplianceThreshold,
    pub instance_count: usize,
    /// Distinct image ids referenced by any instance, resolved or not.
    pub referenced_image_count: usize,
    pub resolved_image_count: usize,
    pub instances: Vec<InstanceRow>,
    /// One row per resolved image, oldest first.
    pub images: Vec<ImageRow>,
    /// Referenced image ids that were not in the fetched image set.
    pub unresolved_image_ids: Vec<String>,
}

impl Report {
    /// Image rows older than the threshold, oldest first.
    pub fn non_compliant(&self) -> impl Iterator<Item = &ImageRow> {
        self.images.iter().filter(|row| !row.compliant)
    }

    pub fn is_compliant(&self) -> bool {
        self.non_compliant().next().is_none()
    }
}

/// Distinct image ids referenced by `instances`, sorted.
pub fn referenced_image_ids(instances: &[Instance]) -> Vec<String> {
    instances
        .iter()
        .map(|i| i.image_id.clone())
        .filter(|id| !id.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Join `instances` to `images` and assess each image against `threshold`.
pub fn build(
    instances: &[Instance],
    images: &[Image],
    now: DateTime<Utc>,
    threshold: ComplianceThreshold,
) -> Report {
    let by_id: HashMap<&str, &Image> = images
        .iter()
        .map(|img| (img.image_id.as_str(), img))
        .collect();

    let mut assessed: HashMap<&str, (&Image, AgeAssessment, usize)> = HashMap::new();
    let mut unresolved: BTreeSet<String> = BTreeSet::new();
    let mut rows = Vec::with_capacity(instances.len());

    for inst in instances {
        let image = match by_id.get(inst.image_id.as_str()).copied() {
            Some(img) => {
                let entry = assessed.entry(img.image_id.as_str()).or_insert_with(|| {
                    let assessment = age::assess(&img.image_id, img.creation_date, now, threshold);
                    (img, assessment, 0)
                });
                entry.2 += 1;
                InstanceImage::Resolved {
                    image_name: img.name.clone(),
                    age_days: entry.1.age_days,
                    compliant: entry.1.compliant,
                }
            }
            None => {
                if !inst.image_id.is_empty() {
                    unresolved.insert(inst.image_id.clone());
                }
                InstanceImage::Unresolvable
            }
        };

        rows.push(InstanceRow {
            instance_id: inst.instance_id.clone(),
            instance_type: inst.instance_type.clone(),
            state: inst.state.clone(),
            launch_time: inst.launch_time,
            image_id: inst.image_id.clone(),
            image,
        });
    }

    let mut image_rows: Vec<ImageRow> = assessed
        .into_values()
        .map(|(img, assessment, instance_count)| ImageRow {
            image_id: assessment.id,
            name: img.name.clone(),
            created: assessment.created,
            age_days: assessment.age_days,
            compliant: assessment.compliant,
            instance_count,
        })
        .collect();
    // oldest first
    image_rows.sort_by(|a, b| {
        a.created
            .cmp(&b.created)
            .then_with(|| a.image_id.cmp(&b.image_id))
    });

    Report {
        generated_at: now,
        threshold_days: threshold,
        instance_count: instances.len(),
        referenced_image_count: referenced_image_ids(instances).len(),
        resolved_image_count: image_rows.len(),
        instances: rows,
        images: image_rows,
        unresolved_image_ids: unresolved.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, image, instance};
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        date(2024, 6, 1)
    }

    #[test]
    fn hundred_day_old_image_is_flagged() {
        let t0 = now();
        let instances = vec![instance("i-1", "ami-1")];
        let images = vec![image("ami-1", "base", t0 - Duration::days(100))];

        let report = build(&instances, &images, t0, ComplianceThreshold::days(90));

        assert_eq!(report.instance_count, 1);
        assert_eq!(report.resolved_image_count, 1);
        assert_eq!(report.images[0].image_id, "ami-1");
        assert_eq!(report.images[0].age_days, 100);
        assert!(!report.images[0].compliant);
        assert!(!report.is_compliant());
        assert_eq!(
            report.instances[0].image,
            InstanceImage::Resolved {
                image_name: "base".to_string(),
                age_days: 100,
                compliant: false
            }
        );
    }

    #[test]
    fn missing_image_is_unresolvable_but_counted() {
        let instances = vec![instance("i-1", "ami-1"), instance("i-2", "ami-x")];
        let images = vec![image("ami-1", "base", now() - Duration::days(5))];

        let report = build(&instances, &images, now(), ComplianceThreshold::default());

        assert_eq!(report.instance_count, 2);
        assert_eq!(report.referenced_image_count, 2);
        assert_eq!(report.resolved_image_count, 1);
        assert_eq!(report.instances[1].image, InstanceImage::Unresolvable);
        assert!(!report.instances[1].is_resolved());
        assert!(report.images.iter().all(|row| row.image_id != "ami-x"));
        assert_eq!(report.unresolved_image_ids, vec!["ami-x".to_string()]);
        assert!(report.is_compliant());
    }

    #[test]
    fn instance_count_ignores_resolution() {
        let instances: Vec<_> = (0..7)
            .map(|n| instance(&format!("i-{n}"), &format!("ami-gone-{}", n % 3)))
            .collect();

        let report = build(&instances, &[], now(), ComplianceThreshold::default());

        assert_eq!(report.instance_count, 7);
        assert_eq!(report.instances.len(), 7);
        assert_eq!(report.resolved_image_count, 0);
        assert!(report.images.is_empty());
        assert_eq!(report.unresolved_image_ids.len(), 3);
    }

    #[test]
    fn image_rows_are_unique_and_count_instances() {
        let instances = vec![
            instance("i-1", "ami-a"),
            instance("i-2", "ami-b"),
            instance("i-3", "ami-a"),
            instance("i-4", "ami-a"),
        ];
        let images = vec![
            image("ami-a", "a", now() - Duration::days(10)),
            image("ami-b", "b", now() - Duration::days(20)),
        ];

        let report = build(&instances, &images, now(), ComplianceThreshold::default());

        let ids: Vec<_> = report.images.iter().map(|r| r.image_id.as_str()).collect();
        assert_eq!(ids, vec!["ami-b", "ami-a"]);
        assert_eq!(report.images[1].instance_count, 3);
        assert_eq!(report.images[0].instance_count, 1);
    }

    #[test]
    fn image_rows_sorted_oldest_first_with_id_tiebreak() {
        let created = now() - Duration::days(30);
        let instances = vec![
            instance("i-1", "ami-new"),
            instance("i-2", "ami-z"),
            instance("i-3", "ami-old"),
            instance("i-4", "ami-y"),
        ];
        let images = vec![
            image("ami-new", "new", now() - Duration::days(1)),
            image("ami-z", "z", created),
            image("ami-old", "old", now() - Duration::days(400)),
            image("ami-y", "y", created),
        ];

        let report = build(&instances, &images, now(), ComplianceThreshold::default());

        let ids: Vec<_> = report.images.iter().map(|r| r.image_id.as_str()).collect();
        assert_eq!(ids, vec!["ami-old", "ami-y", "ami-z", "ami-new"]);
        let stale: Vec<_> = report.non_compliant().map(|r| r.image_id.as_str()).collect();
        assert_eq!(stale, vec!["ami-old"]);
    }

    #[test]
    fn unreferenced_images_are_not_reported() {
        let instances = vec![instance("i-1", "ami-1")];
        let images = vec![
            image("ami-1", "used", now() - Duration::days(1)),
            image("ami-2", "unused", now() - Duration::days(500)),
        ];

        let report = build(&instances, &images, now(), ComplianceThreshold::default());

        assert_eq!(report.images.len(), 1);
        assert!(report.is_compliant());
    }

    #[test]
    fn empty_fleet() {
        let report = build(&[], &[], now(), ComplianceThreshold::default());
        assert_eq!(report.instance_count, 0);
        assert_eq!(report.referenced_image_count, 0);
        assert!(report.instances.is_empty());
        assert!(report.is_compliant());
    }

    #[test]
    fn referenced_ids_are_distinct_and_sorted() {
        let instances = vec![
            instance("i-1", "ami-b"),
            instance("i-2", "ami-a"),
            instance("i-3", "ami-b"),
            instance("i-4", ""),
        ];
        assert_eq!(
            referenced_image_ids(&instances),
            vec!["ami-a".to_string(), "ami-b".to_string()]
        );
    }
}
