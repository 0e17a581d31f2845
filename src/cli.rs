//! Command-line front ends shared by the `check_ami` and `latest_ami`
//! binaries.

use crate::config::{AwsContext, ComplianceThreshold, OutputFormat, RunConfig};
use crate::error::Error;
use crate::filter::{ImageFilter, NamePattern, OwnerFilter};
use crate::finder::{self, LatestImage};
use crate::inventory::{Ec2Inventory, ImageQuery, Inventory};
use crate::render;
use crate::report::{self, Report};
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Exit status when `--fail-on-noncompliant` is set and an image is stale.
pub const EXIT_NONCOMPLIANT: u8 = 2;

/// Arguments shared by both commands.
#[derive(clap::Args, Debug, Clone)]
pub struct CommonArgs {
    /// AWS region to inspect
    #[arg(long, env = "AWS_REGION")]
    pub region: String,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Maximum allowed image age in days
    #[arg(long, default_value_t = ComplianceThreshold::default())]
    pub threshold_days: ComplianceThreshold,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser, Debug)]
#[command(name = "check_ami")]
#[command(about = "Report EC2 instances, their AMIs, and AMI age against the rotation policy")]
#[command(version)]
pub struct CheckAmiArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Exit with status 2 when any AMI in use is older than the threshold
    #[arg(long)]
    pub fail_on_noncompliant: bool,
}

#[derive(Parser, Debug)]
#[command(name = "latest_ami")]
#[command(about = "Find the newest AMI matching an owner and name pattern")]
#[command(version)]
pub struct LatestAmiArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// AMI owner: an account id, an alias such as "amazon", or "self"
    #[arg(long, default_value = "self")]
    pub owner: OwnerFilter,

    /// AMI name pattern; '*' matches any run of characters
    #[arg(long, default_value = NamePattern::DEFAULT)]
    pub name_pattern: NamePattern,
}

impl From<&CommonArgs> for RunConfig {
    fn from(args: &CommonArgs) -> Self {
        Self {
            region: args.region.clone(),
            profile: args.profile.clone(),
            threshold: args.threshold_days,
            fail_on_noncompliant: false,
            output: args.output,
        }
    }
}

impl From<&CheckAmiArgs> for RunConfig {
    fn from(args: &CheckAmiArgs) -> Self {
        Self {
            fail_on_noncompliant: args.fail_on_noncompliant,
            ..RunConfig::from(&args.common)
        }
    }
}

impl LatestAmiArgs {
    pub fn image_filter(&self) -> ImageFilter {
        ImageFilter::new(self.owner.clone(), self.name_pattern.clone())
    }
}

/// Install a stderr tracing subscriber. `RUST_LOG` takes precedence over
/// the verbosity flag.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{level},aws_config=warn,aws_sdk_ec2=warn,aws_smithy_runtime=warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Fetch instances and the images they reference, then build the report.
pub async fn check_ami<I: Inventory>(
    inventory: &I,
    config: &RunConfig,
    now: DateTime<Utc>,
) -> Result<Report, Error> {
    let instances = inventory.list_instances().await?;

    let image_ids = report::referenced_image_ids(&instances);
    let images = if image_ids.is_empty() {
        Vec::new()
    } else {
        inventory.list_images(&ImageQuery::by_ids(image_ids)).await?
    };
    debug!(instances = instances.len(), images = images.len(), "Building report");

    Ok(report::build(&instances, &images, now, config.threshold))
}

/// Query candidate images for `filter` and select the newest.
pub async fn latest_ami<I: Inventory>(
    inventory: &I,
    filter: &ImageFilter,
    config: &RunConfig,
    now: DateTime<Utc>,
) -> Result<LatestImage, Error> {
    let query = ImageQuery::by_owner_and_name(filter.owner.as_query_owner(), filter.name.as_str());
    let images = inventory.list_images(&query).await?;
    finder::find_latest(&images, filter, now, config.threshold)
}

/// Exit status for a finished fleet report.
pub fn check_exit_status(report: &Report, config: &RunConfig) -> u8 {
    if config.fail_on_noncompliant && !report.is_compliant() {
        EXIT_NONCOMPLIANT
    } else {
        0
    }
}

pub async fn run_check_ami(args: CheckAmiArgs) -> anyhow::Result<ExitCode> {
    let config = RunConfig::from(&args);
    info!(region = %config.region, threshold = %config.threshold, "Checking AMI usage");

    let aws = AwsContext::from_run_config(&config).await;
    let inventory = Ec2Inventory::from_context(&aws);
    let report = check_ami(&inventory, &config, Utc::now())
        .await
        .with_context(|| format!("Failed to inspect EC2 instances in {}", config.region))?;

    match config.output {
        OutputFormat::Text => print!("{}", render::fleet_report(&config.region, &report)),
        OutputFormat::Json => println!("{}", render::to_json(&report)?),
    }

    Ok(ExitCode::from(check_exit_status(&report, &config)))
}

pub async fn run_latest_ami(args: LatestAmiArgs) -> anyhow::Result<ExitCode> {
    let config = RunConfig::from(&args.common);
    let filter = args.image_filter();
    info!(region = %config.region, owner = %filter.owner, pattern = %filter.name, "Searching for latest AMI");

    if config.output == OutputFormat::Text {
        print!("{}", render::search_header(&config.region, &filter));
    }

    let aws = AwsContext::from_run_config(&config).await;
    let inventory = Ec2Inventory::from_context(&aws);

    match latest_ami(&inventory, &filter, &config, Utc::now()).await {
        Ok(latest) => {
            match config.output {
                OutputFormat::Text => print!("{}", render::latest_image(&latest)),
                OutputFormat::Json => println!("{}", render::to_json(&latest)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_not_found() => {
            match config.output {
                OutputFormat::Text => print!("{}", render::no_matching_image()),
                OutputFormat::Json => eprintln!("{e}"),
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("Failed to search images in {}", config.region))),
    }
}

/// Print an error and its causes to stderr, with a hint when one is known.
pub fn print_error(e: &anyhow::Error) {
    eprintln!("\nError: {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        eprintln!("  Caused by: {cause}");
        source = cause.source();
    }

    if let Some(hint) = e.downcast_ref::<Error>().and_then(Error::suggestion) {
        eprintln!("\nHint: {hint}");
    }
}
