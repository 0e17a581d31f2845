//! Run configuration and AWS SDK setup.
//!
//! A [`RunConfig`] is built once from command-line arguments and passed by
//! reference to every step of a run; nothing here is mutated afterwards.

use crate::error::Error;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_types::region::Region;
use aws_types::SdkConfig;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Maximum image age, in whole days, allowed by the rotation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ComplianceThreshold(u32);

impl ComplianceThreshold {
    pub const DEFAULT_DAYS: u32 = 90;

    pub const fn days(days: u32) -> Self {
        Self(days)
    }

    pub const fn as_days(self) -> u32 {
        self.0
    }
}

impl Default for ComplianceThreshold {
    fn default() -> Self {
        Self(Self::DEFAULT_DAYS)
    }
}

impl fmt::Display for ComplianceThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ComplianceThreshold {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| Error::InvalidThreshold(s.to_string()))
    }
}

/// How command output is written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Settings shared by both reporting commands for the duration of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub region: String,
    pub profile: Option<String>,
    pub threshold: ComplianceThreshold,
    /// Exit non-zero when any image in use violates the policy.
    pub fail_on_noncompliant: bool,
    pub output: OutputFormat,
}

impl RunConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            profile: None,
            threshold: ComplianceThreshold::default(),
            fail_on_noncompliant: false,
            output: OutputFormat::default(),
        }
    }
}

/// Loaded AWS SDK configuration for a single region.
#[derive(Clone)]
pub struct AwsContext {
    config: SdkConfig,
    region: String,
}

impl AwsContext {
    /// Load credentials and settings from the environment, shared config
    /// files or the instance role, pinned to `region`.
    pub async fn new(region: &str, profile: Option<&str>) -> Self {
        let region_provider =
            RegionProviderChain::first_try(Region::new(region.to_string())).or_default_provider();

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }

        Self {
            config: loader.load().await,
            region: region.to_string(),
        }
    }

    pub async fn from_run_config(config: &RunConfig) -> Self {
        Self::new(&config.region, config.profile.as_deref()).await
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn ec2_client(&self) -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::new(self.sdk_config())
    }
}

impl fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
