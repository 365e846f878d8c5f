//! Byte payloads and the per-request cache.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::format::Format;

/// An owned byte buffer: a request body, a written response, or a message.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Data(Vec<u8>);

impl Data {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The buffer as UTF-8, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.0)
    }

    pub fn parse<T: DeserializeOwned>(&self, format: Format) -> Result<T> {
        format.decode(&self.0)
    }

    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T> {
        self.parse(Format::Json)
    }

    pub fn parse_yaml<T: DeserializeOwned>(&self) -> Result<T> {
        self.parse(Format::Yaml)
    }

    pub fn parse_xml<T: DeserializeOwned>(&self) -> Result<T> {
        self.parse(Format::Xml)
    }

    /// Replaces the buffer with `value` encoded as `format`.
    /// On error the buffer is left untouched.
    pub fn save<T: Serialize + ?Sized>(&mut self, format: Format, value: &T) -> Result<()> {
        self.0 = format.encode(value)?;
        Ok(())
    }

    pub fn save_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.save(Format::Json, value)
    }

    pub fn save_yaml<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.save(Format::Yaml, value)
    }

    pub fn save_xml<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.save(Format::Xml, value)
    }

    pub fn replace(&mut self, bytes: impl Into<Vec<u8>>) {
        self.0 = bytes.into();
    }
}

impl Deref for Data {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data({:?})", self.to_string_lossy())
    }
}

impl From<Vec<u8>> for Data {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&[u8]> for Data {
    fn from(v: &[u8]) -> Self {
        Self(v.to_vec())
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Bytes> for Data {
    fn from(b: Bytes) -> Self {
        Self(b.to_vec())
    }
}

/// Per-request storage for values handed from middleware to handles.
///
/// ```rust
/// # use easierweb::Cache;
/// let mut cache = Cache::default();
/// cache.set("user_id", 42_i64);
/// assert_eq!(cache.get::<i64>("user_id"), Some(&42));
/// assert_eq!(cache.get::<String>("user_id"), None);
/// ```
#[derive(Default)]
pub struct Cache(HashMap<String, Box<dyn Any + Send + Sync>>);

impl Cache {
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> &mut Self {
        self.0.insert(key.into(), Box::new(value));
        self
    }

    /// Returns the value under `key` if it was stored as a `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.0.get(key)?.downcast_ref()
    }

    pub fn del(&mut self, key: &str) -> &mut Self {
        self.0.remove(key);
        self
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}
