//! Shared test fixtures: image and instance builders and an in-memory
//! [`Inventory`].

use crate::error::Error;
use crate::filter::{NamePattern, SELF_OWNER};
use crate::inventory::{Image, ImageQuery, Instance, Inventory};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;

pub const OWNER: &str = "111122223333";

/// Midnight UTC on the given date.
pub fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn image(id: &str, name: &str, created: DateTime<Utc>) -> Image {
    Image {
        image_id: id.to_string(),
        name: name.to_string(),
        description: None,
        owner_id: OWNER.to_string(),
        owner_alias: None,
        creation_date: created,
        architecture: "x86_64".to_string(),
        virtualization_type: "hvm".to_string(),
        root_device_type: "ebs".to_string(),
        state: "available".to_string(),
        encrypted: false,
        block_device_mappings: Vec::new(),
        tags: Vec::new(),
    }
}

pub fn instance(id: &str, image_id: &str) -> Instance {
    Instance {
        instance_id: id.to_string(),
        state: "running".to_string(),
        instance_type: "t3.micro".to_string(),
        launch_time: Some(date(2024, 1, 1)),
        image_id: image_id.to_string(),
    }
}

/// In-memory inventory that applies query filters the way EC2 does.
#[derive(Default)]
pub struct FakeInventory {
    pub instances: Vec<Instance>,
    pub images: Vec<Image>,
    /// When set, every call fails with this provider error code.
    pub fail_with: Option<&'static str>,
    pub image_queries: Mutex<Vec<ImageQuery>>,
}

impl FakeInventory {
    pub fn new(instances: Vec<Instance>, images: Vec<Image>) -> Self {
        Self {
            instances,
            images,
            ..Default::default()
        }
    }

    pub fn failing(code: &'static str) -> Self {
        Self {
            fail_with: Some(code),
            ..Default::default()
        }
    }

    fn check(&self, operation: &'static str) -> Result<(), Error> {
        match self.fail_with {
            Some(code) => Err(Error::Transport {
                operation,
                code: Some(code.to_string()),
                message: format!("{code} from fake"),
            }),
            None => Ok(()),
        }
    }

    pub fn recorded_queries(&self) -> Vec<ImageQuery> {
        self.image_queries.lock().unwrap().clone()
    }
}

impl Inventory for FakeInventory {
    async fn list_instances(&self) -> Result<Vec<Instance>, Error> {
        self.check("DescribeInstances")?;
        Ok(self.instances.clone())
    }

    async fn list_images(&self, query: &ImageQuery) -> Result<Vec<Image>, Error> {
        self.image_queries.lock().unwrap().push(query.clone());
        self.check("DescribeImages")?;

        let name = query.name_pattern.clone().map(NamePattern::new);
        Ok(self
            .images
            .iter()
            .filter(|img| query.image_ids.is_empty() || query.image_ids.contains(&img.image_id))
            .filter(|img| name.as_ref().map_or(true, |p| p.matches(&img.name)))
            .filter(|img| {
                query.owners.is_empty()
                    || query
                        .owners
                        .iter()
                        .any(|o| o == SELF_OWNER || img.is_owned_by(o))
            })
            .filter(|img| !query.available_only || img.state == "available")
            .cloned()
            .collect())
    }
}
