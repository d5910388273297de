//! Link config loader (strict parsing).

pub mod schema;

use std::fs;

use telelink_core::error::{LinkError, Result};

pub use schema::{LinkConfig, LinkSection};

pub fn load_from_file(path: &str) -> Result<LinkConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| LinkError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<LinkConfig> {
    let cfg: LinkConfig = serde_yaml::from_str(s)
        .map_err(|e| LinkError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
