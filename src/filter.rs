//! Image selection predicates.
//!
//! Owner and name criteria are separate predicates combined with a logical
//! AND in [`ImageFilter`].

use crate::inventory::Image;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Owner alias EC2 uses for the caller's own account.
pub const SELF_OWNER: &str = "self";

/// Which account an image must belong to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OwnerFilter {
    /// The caller's account. EC2 scopes the query, so every returned image
    /// matches locally.
    #[default]
    SelfAccount,
    /// An account id, or an owner alias such as `amazon`, matched against
    /// the image's owner id and owner alias.
    Account(String),
}

impl OwnerFilter {
    pub fn matches(&self, image: &Image) -> bool {
        match self {
            OwnerFilter::SelfAccount => true,
            OwnerFilter::Account(owner) => image.is_owned_by(owner),
        }
    }

    /// Value passed in the `Owners` parameter of `DescribeImages`.
    pub fn as_query_owner(&self) -> &str {
        match self {
            OwnerFilter::SelfAccount => SELF_OWNER,
            OwnerFilter::Account(id) => id,
        }
    }
}

impl FromStr for OwnerFilter {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(if s.eq_ignore_ascii_case(SELF_OWNER) {
            OwnerFilter::SelfAccount
        } else {
            OwnerFilter::Account(s.to_string())
        })
    }
}

impl fmt::Display for OwnerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query_owner())
    }
}

impl Serialize for OwnerFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_query_owner())
    }
}

/// Case-sensitive name glob where `*` matches any run of characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NamePattern(String);

impl NamePattern {
    pub const DEFAULT: &'static str = "*company-abc*";

    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, name: &str) -> bool {
        glob_match(&self.0, name)
    }
}

impl Default for NamePattern {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NamePattern {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Owner and name criteria an image must both satisfy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageFilter {
    pub owner: OwnerFilter,
    pub name: NamePattern,
}

impl ImageFilter {
    pub fn new(owner: OwnerFilter, name: NamePattern) -> Self {
        Self { owner, name }
    }

    pub fn matches(&self, image: &Image) -> bool {
        self.owner.matches(image) && self.name.matches(&image.name)
    }
}

/// Anchored match of `text` against `pattern`, where `*` matches any
/// (possibly empty) substring and everything else is literal.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    // split always yields at least one element
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    let mut middle: Vec<&str> = parts.collect();
    let Some(last) = middle.pop() else {
        // no wildcard at all
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, date};

    fn image(id: &str, name: &str, owner: &str) -> Image {
        let mut img = testing::image(id, name, date(2024, 1, 1));
        img.owner_id = owner.to_string();
        img
    }

    #[test]
    fn glob_wildcards() {
        assert!(glob_match("*company-abc*", "company-abc-v1"));
        assert!(glob_match("*company-abc*", "base-company-abc"));
        assert!(glob_match("*", ""));
        assert!(glob_match("web-*-prod", "web-2024-prod"));
        assert!(glob_match("web-*-prod", "web--prod"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(glob_match("**", "anything"));
    }

    #[test]
    fn glob_is_anchored_and_literal() {
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exact-name"));
        assert!(!glob_match("web-*", "my-web-1"));
        assert!(!glob_match("*-prod", "web-prod-1"));
        assert!(!glob_match("a*b*c", "acb"));
        assert!(!glob_match("ab*ba", "aba"));
        assert!(!glob_match("v1.?", "v1.2"));
    }

    #[test]
    fn glob_is_case_sensitive() {
        assert!(!glob_match("*Company*", "company-abc"));
        assert!(NamePattern::new("*ABC*").matches("x-ABC-y"));
        assert!(!NamePattern::new("*ABC*").matches("x-abc-y"));
    }

    #[test]
    fn owner_filter_parsing() {
        assert_eq!("self".parse::<OwnerFilter>().unwrap(), OwnerFilter::SelfAccount);
        assert_eq!("SELF".parse::<OwnerFilter>().unwrap(), OwnerFilter::SelfAccount);
        assert_eq!(
            "123456789012".parse::<OwnerFilter>().unwrap(),
            OwnerFilter::Account("123456789012".to_string())
        );
        assert_eq!(OwnerFilter::SelfAccount.as_query_owner(), "self");
        assert_eq!(OwnerFilter::Account("amazon".into()).to_string(), "amazon");
    }

    #[test]
    fn owner_filter_matches_owner_id() {
        let img = image("ami-1", "company-abc", "111122223333");
        assert!(OwnerFilter::SelfAccount.matches(&img));
        assert!(OwnerFilter::Account("111122223333".into()).matches(&img));
        assert!(!OwnerFilter::Account("444455556666".into()).matches(&img));
    }

    #[test]
    fn owner_filter_matches_alias() {
        let mut img = image("ami-1", "al2023-ami-2023.4", "137112412989");
        img.owner_alias = Some("amazon".to_string());

        let owner: OwnerFilter = "amazon".parse().unwrap();
        assert!(owner.matches(&img));
        assert!(OwnerFilter::Account("137112412989".into()).matches(&img));
        assert!(!OwnerFilter::Account("aws-marketplace".into()).matches(&img));

        img.owner_alias = None;
        assert!(!owner.matches(&img));
    }

    #[test]
    fn image_filter_requires_both_predicates() {
        let filter = ImageFilter::new(
            OwnerFilter::Account("111122223333".into()),
            NamePattern::default(),
        );
        assert!(filter.matches(&image("a", "company-abc-v1", "111122223333")));
        assert!(!filter.matches(&image("b", "company-abc-v1", "444455556666")));
        assert!(!filter.matches(&image("c", "other-v1", "111122223333")));
    }
}
