//! Text and JSON rendering for both reports.
//!
//! Text output is produced by [`fmt::Display`] views so the same layout can
//! be written to any formatter; the `String` helpers wrap them.

use crate::finder::LatestImage;
use crate::filter::ImageFilter;
use crate::report::{InstanceImage, Report};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

const RULE_WIDTH: usize = 100;
const NAME_WIDTH: usize = 29;

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

fn status(compliant: bool) -> &'static str {
    if compliant {
        "OK"
    } else {
        "ROTATE"
    }
}

/// Pretty-printed JSON for any report value.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Text layout of a [`Report`] for one region.
pub struct FleetReportView<'a> {
    pub region: &'a str,
    pub report: &'a Report,
}

impl fmt::Display for FleetReportView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let rule = "-".repeat(RULE_WIDTH);
        let threshold = report.threshold_days;

        writeln!(f, "Checking EC2 instances in region: {}", self.region)?;
        writeln!(f, "{}", "=".repeat(50))?;

        if report.instance_count == 0 {
            return writeln!(f, "No EC2 instances found.");
        }

        writeln!(f, "\nSUMMARY:")?;
        writeln!(f, "Total EC2 instances: {}", report.instance_count)?;
        writeln!(f, "Unique AMIs in use: {}", report.referenced_image_count)?;
        writeln!(f, "AMIs resolved: {}", report.resolved_image_count)?;
        writeln!(f, "Rotation threshold: {threshold} days")?;

        writeln!(f, "\nEC2 INSTANCES:")?;
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            "{:<20} {:<14} {:<10} {:<22} {:<20} {:<10}",
            "Instance ID", "Type", "State", "AMI ID", "Launch Time", "Age (days)"
        )?;
        writeln!(f, "{rule}")?;
        for row in &report.instances {
            let launched = row
                .launch_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            let age = match &row.image {
                InstanceImage::Resolved { age_days, .. } => age_days.to_string(),
                InstanceImage::Unresolvable => "Unknown".to_string(),
            };
            writeln!(
                f,
                "{:<20} {:<14} {:<10} {:<22} {:<20} {:<10}",
                row.instance_id, row.instance_type, row.state, row.image_id, launched, age
            )?;
        }

        writeln!(f, "\nAMI INFORMATION (oldest first):")?;
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            "{:<22} {:<30} {:<24} {:<11} {:<6}",
            "AMI ID", "AMI Name", "Created", "Age (days)", "Status"
        )?;
        writeln!(f, "{rule}")?;
        for row in &report.images {
            writeln!(
                f,
                "{:<22} {:<30} {:<24} {:<11} {:<6}",
                row.image_id,
                truncate(&row.name, NAME_WIDTH),
                timestamp(&row.created),
                row.age_days,
                status(row.compliant)
            )?;
        }
        for id in &report.unresolved_image_ids {
            writeln!(
                f,
                "{:<22} {:<30} {:<24} {:<11} {:<6}",
                id, "Unknown", "Unknown", "Unknown", "-"
            )?;
        }

        if !report.unresolved_image_ids.is_empty() {
            writeln!(
                f,
                "\nUNRESOLVED AMIs (deregistered or not accessible from this account):"
            )?;
            for id in &report.unresolved_image_ids {
                writeln!(f, "  - {id}")?;
            }
        }

        let stale: Vec<_> = report.non_compliant().collect();
        if stale.is_empty() {
            writeln!(
                f,
                "\n✅ All AMIs are within the {threshold}-day rotation policy."
            )?;
        } else {
            writeln!(f, "\n⚠️  AMI ROTATION WARNING:")?;
            writeln!(
                f,
                "The following AMIs are older than {threshold} days and should be rotated:"
            )?;
            for row in stale {
                writeln!(
                    f,
                    "  - {}: {} ({} days old, {} instance(s))",
                    row.image_id, row.name, row.age_days, row.instance_count
                )?;
            }
        }

        Ok(())
    }
}

pub fn fleet_report(region: &str, report: &Report) -> String {
    FleetReportView { region, report }.to_string()
}

struct SearchHeader<'a> {
    region: &'a str,
    filter: &'a ImageFilter,
}

impl fmt::Display for SearchHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Searching for latest AMI in region: {}", self.region)?;
        writeln!(f, "Name pattern: {}", self.filter.name)?;
        writeln!(f, "Owner: {}", self.filter.owner)?;
        writeln!(f, "{}", "=".repeat(50))
    }
}

pub fn search_header(region: &str, filter: &ImageFilter) -> String {
    SearchHeader { region, filter }.to_string()
}

/// Metadata block for the image chosen by `find_latest`.
pub struct LatestImageView<'a>(pub &'a LatestImage);

impl fmt::Display for LatestImageView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let latest = self.0;
        let image = &latest.image;
        let assessment = &latest.assessment;

        writeln!(f, "Latest AMI Found:")?;
        writeln!(f, "==================")?;
        writeln!(f, "AMI ID:          {}", image.image_id)?;
        writeln!(f, "Name:            {}", image.name)?;
        writeln!(
            f,
            "Description:     {}",
            image.description.as_deref().unwrap_or("N/A")
        )?;
        writeln!(f, "Owner ID:        {}", image.owner_id)?;
        if let Some(alias) = &image.owner_alias {
            writeln!(f, "Owner Alias:     {alias}")?;
        }
        writeln!(f, "Architecture:    {}", image.architecture)?;
        writeln!(f, "Root Device:     {}", image.root_device_type)?;
        writeln!(f, "Virtualization:  {}", image.virtualization_type)?;
        writeln!(f, "State:           {}", image.state)?;
        writeln!(
            f,
            "Encrypted:       {}",
            if image.encrypted { "Yes" } else { "No" }
        )?;
        writeln!(f, "Created:         {}", timestamp(&image.creation_date))?;
        writeln!(f, "Age:             {} days", assessment.age_days)?;
        writeln!(f, "Matching AMIs:   {}", latest.candidates)?;

        if !image.tags.is_empty() {
            writeln!(f, "Tags:")?;
            for tag in &image.tags {
                writeln!(f, "  {}: {}", tag.key, tag.value)?;
            }
        }

        writeln!(f, "\nBlock Device Mappings:")?;
        for mapping in &image.block_device_mappings {
            match &mapping.ebs {
                Some(ebs) => {
                    let size = ebs
                        .volume_size_gib
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "N/A".to_string());
                    writeln!(
                        f,
                        "  {}: {}GB ({}) {}",
                        mapping.device_name,
                        size,
                        ebs.volume_type.as_deref().unwrap_or("N/A"),
                        if ebs.encrypted {
                            "Encrypted"
                        } else {
                            "Not Encrypted"
                        }
                    )?;
                }
                None => writeln!(f, "  {}: instance store", mapping.device_name)?,
            }
        }

        if assessment.compliant {
            writeln!(
                f,
                "\n✅ AMI is within the {}-day rotation policy ({} days old)",
                latest.threshold_days, assessment.age_days
            )
        } else {
            writeln!(
                f,
                "\n⚠️  WARNING: This AMI is {} days old (>{} days)",
                assessment.age_days, latest.threshold_days
            )?;
            writeln!(f, "Consider updating to a newer AMI for security compliance.")
        }
    }
}

pub fn latest_image(latest: &LatestImage) -> String {
    LatestImageView(latest).to_string()
}

const NO_MATCH: &str = "\
No AMI found matching the specified criteria.

Possible reasons:
- No AMIs with the specified name pattern exist
- AMIs might be owned by a different account
- AMIs might be in a different region
- AMIs might be in 'pending' or 'failed' state
";

pub fn no_matching_image() -> String {
    NO_MATCH.to_string()
}
