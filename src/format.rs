//! The three wire formats handles can bind from and write to.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Root element used when an XML value has no type name of its own
/// (maps, `serde_json::Value`).
const XML_ROOT: &str = "xml";

/// A structured body format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Json,
    Yaml,
    Xml,
}

impl Format {
    /// The `content-type` written alongside an encoded body.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Yaml => "application/yaml",
            Self::Xml  => "application/xml",
        }
    }

    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            Self::Json => Ok(serde_json::to_vec(value)?),
            Self::Yaml => Ok(serde_yaml::to_string(value)?.into_bytes()),
            Self::Xml => quick_xml::se::to_string(value)
                .or_else(|_| quick_xml::se::to_string_with_root(XML_ROOT, value))
                .map(String::into_bytes)
                .map_err(Error::xml),
        }
    }

    /// Like [`encode`](Self::encode), with `root` as the XML root element.
    pub fn encode_with_root<T: Serialize + ?Sized>(self, root: &str, value: &T) -> Result<Vec<u8>> {
        match self {
            Self::Xml => quick_xml::se::to_string_with_root(root, value)
                .map(String::into_bytes)
                .map_err(Error::xml),
            other => other.encode(value),
        }
    }

    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            Self::Json => Ok(serde_json::from_slice(bytes)?),
            Self::Yaml => Ok(serde_yaml::from_slice(bytes)?),
            Self::Xml  => quick_xml::de::from_reader(bytes).map_err(Error::xml),
        }
    }
}
