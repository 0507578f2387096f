//! External build identifiers.
//!
//! Queue entries and executions are numbered from two independent sequences,
//! so a bare number is ambiguous. Identifiers handed to SpaceCode carry the
//! sequence in a prefix: `queue-item-<n>` or `build-<n>`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::types::{BuildNumber, QueueId};

const QUEUE_ITEM_PREFIX: &str = "queue-item-";
const BUILD_PREFIX: &str = "build-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildRef {
    Queued(QueueId),
    Build(BuildNumber),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildRefError {
    #[error("build id `{0}` must start with `queue-item-` or `build-`")]
    UnknownPrefix(String),

    #[error("build id `{0}` does not end in a decimal number")]
    InvalidNumber(String),
}

impl FromStr for BuildRef {
    type Err = BuildRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(digits) = s.strip_prefix(QUEUE_ITEM_PREFIX) {
            parse_number(s, digits).map(|n| BuildRef::Queued(QueueId(n)))
        } else if let Some(digits) = s.strip_prefix(BUILD_PREFIX) {
            parse_number(s, digits).map(|n| BuildRef::Build(BuildNumber(n)))
        } else {
            Err(BuildRefError::UnknownPrefix(s.to_string()))
        }
    }
}

fn parse_number(whole: &str, digits: &str) -> Result<u64, BuildRefError> {
    // `u64::from_str` accepts a leading `+`; the wire format does not.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BuildRefError::InvalidNumber(whole.to_string()));
    }
    digits
        .parse()
        .map_err(|_| BuildRefError::InvalidNumber(whole.to_string()))
}

impl fmt::Display for BuildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildRef::Queued(id) => write!(f, "{QUEUE_ITEM_PREFIX}{}", id.0),
            BuildRef::Build(number) => write!(f, "{BUILD_PREFIX}{}", number.0),
        }
    }
}

impl Serialize for BuildRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BuildRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
