//! Read-only EC2 inventory: instances and the images they run.
//!
//! [`Inventory`] is the seam between the reporting logic and AWS. The
//! production implementation is [`Ec2Inventory`]; tests use an in-memory
//! fake.

use crate::config::AwsContext;
use crate::error::Error;
use aws_sdk_ec2::types::{self as ec2, Filter};
use aws_sdk_ec2::Client as Ec2Client;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use tracing::{debug, info, warn};

/// Instance lifecycle states reported on. Terminated instances are ignored.
const LIVE_INSTANCE_STATES: &[&str] = &[
    "pending",
    "running",
    "shutting-down",
    "stopping",
    "stopped",
];

/// EC2 accepts at most 200 values per filter.
const MAX_FILTER_VALUES: usize = 200;

/// A snapshot of one EC2 instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub instance_id: String,
    pub state: String,
    pub instance_type: String,
    pub launch_time: Option<DateTime<Utc>>,
    /// Image the instance was launched from; the image may no longer exist.
    pub image_id: String,
}

/// A snapshot of one machine image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub image_id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    /// Owner alias such as `amazon`, when EC2 reports one.
    pub owner_alias: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub architecture: String,
    pub virtualization_type: String,
    pub root_device_type: String,
    pub state: String,
    pub encrypted: bool,
    pub block_device_mappings: Vec<BlockDeviceMapping>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDeviceMapping {
    pub device_name: String,
    pub ebs: Option<EbsVolume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EbsVolume {
    pub volume_size_gib: Option<i32>,
    pub volume_type: Option<String>,
    pub encrypted: bool,
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Image {
    /// True when `owner` names this image's owning account, either by id or
    /// by the alias EC2 reports for it.
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner_id == owner || self.owner_alias.as_deref() == Some(owner)
    }
}

/// True when the mappings include EBS storage and every EBS volume is encrypted.
pub fn storage_encrypted(mappings: &[BlockDeviceMapping]) -> bool {
    let mut volumes = mappings.iter().filter_map(|m| m.ebs.as_ref()).peekable();
    volumes.peek().is_some() && volumes.all(|ebs| ebs.encrypted)
}

/// Criteria for a `DescribeImages` query.
#[derive(Debug, Clone, Default)]
pub struct ImageQuery {
    /// Owner account ids or aliases, e.g. `self` or `amazon`.
    pub owners: Vec<String>,
    /// EC2 `name` filter; EC2 applies the same `*` wildcard.
    pub name_pattern: Option<String>,
    pub image_ids: Vec<String>,
    pub available_only: bool,
}

impl ImageQuery {
    pub fn by_ids(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            image_ids: ids.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn by_owner_and_name(owner: impl Into<String>, name_pattern: impl Into<String>) -> Self {
        Self {
            owners: vec![owner.into()],
            name_pattern: Some(name_pattern.into()),
            available_only: true,
            ..Default::default()
        }
    }

    fn filters(&self, ids: &[String]) -> Vec<Filter> {
        let mut filters = Vec::new();
        if let Some(pattern) = &self.name_pattern {
            filters.push(Filter::builder().name("name").values(pattern).build());
        }
        if self.available_only {
            filters.push(Filter::builder().name("state").values("available").build());
        }
        if !ids.is_empty() {
            filters.push(
                Filter::builder()
                    .name("image-id")
                    .set_values(Some(ids.to_vec()))
                    .build(),
            );
        }
        filters
    }

    /// One filter set per `DescribeImages` drain. Image ids are split so no
    /// `image-id` filter carries more than [`MAX_FILTER_VALUES`] values.
    pub fn filter_sets(&self) -> Vec<Vec<Filter>> {
        if self.image_ids.is_empty() {
            return vec![self.filters(&[])];
        }
        self.image_ids
            .chunks(MAX_FILTER_VALUES)
            .map(|chunk| self.filters(chunk))
            .collect()
    }
}

/// Inventory queries that can be faked in tests.
pub trait Inventory: Send + Sync {
    /// All instances that are not terminated, across every result page.
    fn list_instances(&self) -> impl Future<Output = Result<Vec<Instance>, Error>> + Send;

    /// All images matching `query`, across every result page.
    fn list_images(
        &self,
        query: &ImageQuery,
    ) -> impl Future<Output = Result<Vec<Image>, Error>> + Send;
}

/// [`Inventory`] backed by the EC2 API of a single region.
pub struct Ec2Inventory {
    client: Ec2Client,
    region: String,
}

impl Ec2Inventory {
    pub fn new(client: Ec2Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    pub fn from_context(ctx: &AwsContext) -> Self {
        Self::new(ctx.ec2_client(), ctx.region())
    }

    /// Every image matching `filters`, following `next_token` to the end.
    async fn describe_images_all(
        &self,
        query: &ImageQuery,
        filters: Vec<Filter>,
    ) -> Result<Vec<Image>, Error> {
        let owners = (!query.owners.is_empty()).then(|| query.owners.clone());

        drain_pages(|next_token| {
            let request = self
                .client
                .describe_images()
                .set_owners(owners.clone())
                .set_filters(Some(filters.clone()))
                .set_next_token(next_token);
            async move {
                let resp = request
                    .send()
                    .await
                    .map_err(|e| Error::transport("DescribeImages", &e))?;
                let images: Vec<Image> = resp.images().iter().filter_map(convert_image).collect();
                Ok::<_, Error>((images, resp.next_token().map(str::to_string)))
            }
        })
        .await
    }
}

impl Inventory for Ec2Inventory {
    async fn list_instances(&self) -> Result<Vec<Instance>, Error> {
        let live_states = Filter::builder()
            .name("instance-state-name")
            .set_values(Some(
                LIVE_INSTANCE_STATES.iter().map(|s| s.to_string()).collect(),
            ))
            .build();

        let instances = drain_pages(|next_token| {
            let request = self
                .client
                .describe_instances()
                .filters(live_states.clone())
                .set_next_token(next_token);
            async move {
                let resp = request
                    .send()
                    .await
                    .map_err(|e| Error::transport("DescribeInstances", &e))?;
                let instances: Vec<Instance> = resp
                    .reservations()
                    .iter()
                    .flat_map(|res| res.instances())
                    .filter_map(convert_instance)
                    .collect();
                Ok::<_, Error>((instances, resp.next_token().map(str::to_string)))
            }
        })
        .await?;

        info!(region = %self.region, count = instances.len(), "Listed EC2 instances");
        Ok(instances)
    }

    async fn list_images(&self, query: &ImageQuery) -> Result<Vec<Image>, Error> {
        let mut images = Vec::new();
        for filters in query.filter_sets() {
            images.extend(self.describe_images_all(query, filters).await?);
        }

        info!(region = %self.region, count = images.len(), "Listed images");
        Ok(images)
    }
}

/// Collect items across result pages. `fetch` is called with the token of
/// the page to request (`None` for the first) and returns that page's items
/// with the next token. Draining stops at a missing or empty token.
async fn drain_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, Error>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<String>), Error>>,
{
    let mut items = Vec::new();
    let mut next_token: Option<String> = None;
    let mut page = 0usize;

    loop {
        let (batch, token) = fetch(next_token.take()).await?;
        page += 1;
        debug!(page, count = batch.len(), "Fetched result page");
        items.extend(batch);

        match token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    Ok(items)
}

fn convert_instance(inst: &ec2::Instance) -> Option<Instance> {
    let Some(instance_id) = inst.instance_id() else {
        warn!("Skipping instance without an id");
        return None;
    };

    Some(Instance {
        instance_id: instance_id.to_string(),
        state: inst
            .state()
            .and_then(|s| s.name())
            .map(|n| n.as_str())
            .unwrap_or("unknown")
            .to_string(),
        instance_type: inst
            .instance_type()
            .map(|t| t.as_str())
            .unwrap_or("unknown")
            .to_string(),
        launch_time: inst
            .launch_time()
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
        image_id: inst.image_id().unwrap_or_default().to_string(),
    })
}

fn convert_image(img: &ec2::Image) -> Option<Image> {
    let image_id = img.image_id()?;

    let creation_date = match img.creation_date().and_then(parse_creation_date) {
        Some(date) => date,
        None => {
            warn!(
                image_id = %image_id,
                creation_date = ?img.creation_date(),
                "Skipping image with missing or unparseable creation date"
            );
            return None;
        }
    };

    let block_device_mappings: Vec<BlockDeviceMapping> = img
        .block_device_mappings()
        .iter()
        .map(|m| BlockDeviceMapping {
            device_name: m.device_name().unwrap_or_default().to_string(),
            ebs: m.ebs().map(|ebs| EbsVolume {
                volume_size_gib: ebs.volume_size(),
                volume_type: ebs.volume_type().map(|t| t.as_str().to_string()),
                encrypted: ebs.encrypted().unwrap_or(false),
                snapshot_id: ebs.snapshot_id().map(str::to_string),
            }),
        })
        .collect();

    let tags = img
        .tags()
        .iter()
        .filter_map(|tag| match (tag.key(), tag.value()) {
            (Some(key), Some(value)) => Some(Tag {
                key: key.to_string(),
                value: value.to_string(),
            }),
            _ => None,
        })
        .collect();

    Some(Image {
        image_id: image_id.to_string(),
        name: img.name().unwrap_or_default().to_string(),
        description: img.description().map(str::to_string),
        owner_id: img.owner_id().unwrap_or_default().to_string(),
        owner_alias: img.image_owner_alias().map(str::to_string),
        creation_date,
        architecture: enum_str(img.architecture().map(|a| a.as_str())),
        virtualization_type: enum_str(img.virtualization_type().map(|v| v.as_str())),
        root_device_type: enum_str(img.root_device_type().map(|d| d.as_str())),
        state: enum_str(img.state().map(|s| s.as_str())),
        encrypted: storage_encrypted(&block_device_mappings),
        block_device_mappings,
        tags,
    })
}

fn enum_str(value: Option<&str>) -> String {
    value.unwrap_or("unknown").to_string()
}

/// Parse an EC2 `CreationDate` such as `2024-03-01T12:30:00.000Z`.
pub fn parse_creation_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
