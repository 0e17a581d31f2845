//! Read-only reporting on AMI usage and age across an EC2 fleet.
//!
//! Two binaries share this library: `check_ami` joins running instances to
//! the images they were launched from and flags images older than the
//! rotation threshold, and `latest_ami` finds the newest image matching an
//! owner and name pattern.

pub mod age;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod finder;
pub mod inventory;
pub mod render;
pub mod report;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AwsContext, ComplianceThreshold, OutputFormat, RunConfig};
pub use error::Error;
pub use inventory::{Ec2Inventory, Image, ImageQuery, Instance, Inventory};
