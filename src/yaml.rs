//! YAML reading and writing for configuration files and snapshot exports.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};

pub fn parse<T: DeserializeOwned>(input: &str) -> Result<T> {
    serde_yaml::from_str(input).context("Parsing YAML")
}

pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Reading YAML file {path:?}"))?;
    parse(&raw).with_context(|| format!("Loading YAML file {path:?}"))
}

pub fn to_string<T: Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value).context("Serializing YAML")
}
