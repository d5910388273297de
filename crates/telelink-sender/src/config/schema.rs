use std::time::Duration;

use serde::Deserialize;
use telelink_core::error::{LinkError, Result};
use telelink_core::protocol::tag::{DEFAULT_TAG_LEN, MAX_TAG_LEN, MIN_TAG_LEN};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    pub version: u32,

    #[serde(default)]
    pub link: LinkSection,
}

impl LinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(LinkError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.link.validate()
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            version: 1,
            link: LinkSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSection {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,

    #[serde(default = "default_delivery_tag_len")]
    pub delivery_tag_len: usize,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            open_timeout_ms: default_open_timeout_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            delivery_tag_len: default_delivery_tag_len(),
        }
    }
}

impl LinkSection {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LinkError::Config("link.name must not be empty".into()));
        }
        if !(1000..=300_000).contains(&self.open_timeout_ms) {
            return Err(LinkError::Config(
                "link.open_timeout_ms must be between 1000 and 300000".into(),
            ));
        }
        if !(100..=600_000).contains(&self.send_timeout_ms) {
            return Err(LinkError::Config(
                "link.send_timeout_ms must be between 100 and 600000".into(),
            ));
        }
        if !(100..=300_000).contains(&self.close_timeout_ms) {
            return Err(LinkError::Config(
                "link.close_timeout_ms must be between 100 and 300000".into(),
            ));
        }
        if !(MIN_TAG_LEN..=MAX_TAG_LEN).contains(&self.delivery_tag_len) {
            return Err(LinkError::Config(format!(
                "link.delivery_tag_len must be between {MIN_TAG_LEN} and {MAX_TAG_LEN}"
            )));
        }
        Ok(())
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

fn default_name() -> String {
    "events".into()
}
fn default_open_timeout_ms() -> u64 {
    30_000
}
fn default_send_timeout_ms() -> u64 {
    60_000
}
fn default_close_timeout_ms() -> u64 {
    30_000
}
fn default_delivery_tag_len() -> usize {
    DEFAULT_TAG_LEN
}
