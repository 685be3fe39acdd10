use std::{num::NonZeroUsize, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{NagareError, NagareResult};

pub const DEFAULT_CODEC: &str = "video/mp4; codecs=\"avc1.640028\"";

/// What happens to a locator arriving at a full queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Discard the head of the queue to make room.
    DropOldest,
    /// Discard the incoming locator.
    #[default]
    DropNewest,
}

impl FromStr for OverflowPolicy {
    type Err = NagareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop-oldest" | "oldest" => Ok(Self::DropOldest),
            "drop-newest" | "newest" => Ok(Self::DropNewest),
            _ => Err(NagareError::InvalidConfig(format!(
                "unknown overflow policy: {s}"
            ))),
        }
    }
}

/// Where fragment locators come from.
#[derive(Debug, Clone, PartialEq)]
pub enum Feed {
    /// Open-ended feed of `segment_path` notifications.
    Live(Url),
    /// Finite list of relative fragment paths, ends the session when drained.
    Static(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
    #[serde(default)]
    pub notification_endpoint: Option<Url>,

    #[serde(default)]
    pub fragments: Vec<String>,

    pub fragment_base_url: Url,

    #[serde(default = "default_codec")]
    pub codec: String,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default)]
    pub dedup: bool,

    #[serde(default)]
    pub queue_capacity: Option<NonZeroUsize>,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// HTTP timeout, in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_codec() -> String {
    DEFAULT_CODEC.to_string()
}

fn default_retries() -> u32 {
    3
}

fn default_timeout() -> u64 {
    10
}

impl PlayerConfig {
    pub fn live(notification_endpoint: Url, fragment_base_url: Url) -> Self {
        Self {
            notification_endpoint: Some(notification_endpoint),
            ..Self::new(fragment_base_url)
        }
    }

    pub fn fixed(fragments: Vec<String>, fragment_base_url: Url) -> Self {
        Self {
            fragments,
            ..Self::new(fragment_base_url)
        }
    }

    fn new(fragment_base_url: Url) -> Self {
        Self {
            notification_endpoint: None,
            fragments: Vec::new(),
            fragment_base_url,
            codec: default_codec(),
            retries: default_retries(),
            dedup: false,
            queue_capacity: None,
            overflow: OverflowPolicy::default(),
            timeout: default_timeout(),
        }
    }

    /// Selects the feed variant, rejecting configs naming neither or both.
    pub fn feed(&self) -> NagareResult<Feed> {
        match (&self.notification_endpoint, self.fragments.is_empty()) {
            (Some(endpoint), true) => Ok(Feed::Live(endpoint.clone())),
            (None, false) => Ok(Feed::Static(self.fragments.clone())),
            (Some(_), false) => Err(NagareError::InvalidConfig(
                "notificationEndpoint and fragments are mutually exclusive".to_string(),
            )),
            (None, true) => Err(NagareError::InvalidConfig(
                "either notificationEndpoint or fragments is required".to_string(),
            )),
        }
    }
}
