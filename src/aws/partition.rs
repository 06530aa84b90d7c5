use std::{fmt, str::FromStr};

use crate::error::Error;

/// Partition id derived from a region name prefix.
///
/// Only the prefixes are known here, not the full region tables: an unknown
/// region is assumed to be in the commercial partition.
pub fn partition_for_region(region: &str) -> &'static str {
    match region {
        r if r.starts_with("cn-") => "aws-cn",
        r if r.starts_with("us-gov-") => "aws-us-gov",
        r if r.starts_with("us-isob-") => "aws-iso-b",
        r if r.starts_with("us-isof-") => "aws-iso-f",
        r if r.starts_with("us-iso-") => "aws-iso",
        r if r.starts_with("eu-isoe-") => "aws-iso-e",
        _ => "aws",
    }
}

/// The parts of an ARN needed for account discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account_id: String,
    pub resource: String,
}

impl FromStr for Arn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidConfiguration(format!("malformed ARN: {s:?}"));

        let mut parts = s.splitn(6, ':');
        if parts.next() != Some("arn") {
            return Err(invalid());
        }
        let mut next = || parts.next().ok_or_else(invalid);
        let partition = next()?;
        let service = next()?;
        let region = next()?;
        let account_id = next()?;
        let resource = next()?;

        if partition.is_empty() || service.is_empty() || resource.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            partition: partition.to_string(),
            service: service.to_string(),
            region: region.to_string(),
            account_id: account_id.to_string(),
            resource: resource.to_string(),
        })
    }
}

impl Arn {
    pub fn parse(s: &str) -> Result<Self, Error> {
        s.parse()
    }

    /// Account id, if the ARN carries a 12-digit one.
    pub fn account(&self) -> Option<&str> {
        let id = self.account_id.as_str();
        (id.len() == 12 && id.bytes().all(|b| b.is_ascii_digit())).then_some(id)
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account_id, self.resource
        )
    }
}
