//! Reading configuration files into typed structs.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Deserializes a JSON file.
pub fn read_json_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Deserializes a YAML file.
pub fn read_yaml_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_yaml::from_slice(&bytes)?)
}

/// Deserializes an XML file. The root element name is not checked.
pub fn read_xml_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    quick_xml::de::from_str(&text).map_err(Error::xml)
}
