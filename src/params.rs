//! String key/value maps for header, path, query and form values.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// A string-to-string map with typed accessors.
///
/// ```rust
/// # use easierweb::Params;
/// let mut query = Params::default();
/// query.set("id", "42").set("price", "10.24");
/// assert_eq!(query.int64("id").unwrap(), 42);
/// assert_eq!(query.get_float64("price"), 10.24);
/// assert_eq!(query.get_int("missing"), 0);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
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

    pub fn values(&self) -> Vec<&str> {
        self.0.values().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies every entry of `other` into `self`, overriding existing keys.
    pub fn extend_from(&mut self, other: &Params) -> &mut Self {
        self.0.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Inserts `value` only if `key` is absent: the first occurrence of a
    /// repeated query or form key wins.
    pub(crate) fn insert_first(&mut self, key: String, value: String) {
        self.0.entry(key).or_insert(value);
    }

    /// Parses the value under `key`. A missing key is an error.
    pub fn parse<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.get(key).ok_or_else(|| Error::Param {
            key: key.to_owned(),
            message: "missing".to_owned(),
        })?;
        raw.parse().map_err(|e: T::Err| Error::Param {
            key: key.to_owned(),
            message: format!("`{raw}`: {e}"),
        })
    }

    pub fn int(&self, key: &str) -> Result<isize> {
        self.parse(key)
    }

    pub fn int32(&self, key: &str) -> Result<i32> {
        self.parse(key)
    }

    pub fn int64(&self, key: &str) -> Result<i64> {
        self.parse(key)
    }

    pub fn float32(&self, key: &str) -> Result<f32> {
        self.parse(key)
    }

    pub fn float64(&self, key: &str) -> Result<f64> {
        self.parse(key)
    }

    pub fn get_int(&self, key: &str) -> isize {
        self.int(key).unwrap_or_default()
    }

    pub fn get_int32(&self, key: &str) -> i32 {
        self.int32(key).unwrap_or_default()
    }

    pub fn get_int64(&self, key: &str) -> i64 {
        self.int64(key).unwrap_or_default()
    }

    pub fn get_float32(&self, key: &str) -> f32 {
        self.float32(key).unwrap_or_default()
    }

    pub fn get_float64(&self, key: &str) -> f64 {
        self.float64(key).unwrap_or_default()
    }

    /// Binds the map into `T`. String values are converted to the field
    /// types (`"3"` into an `i64`, `"true"` into a `bool`); fields absent
    /// from the map need `#[serde(default)]` or an `Option` type.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T> {
        let encoded = serde_urlencoded::to_string(&self.0)?;
        Ok(serde_urlencoded::from_str(&encoded)?)
    }

    /// Parses an `application/x-www-form-urlencoded` string (a query string
    /// or a form body). Undecodable input yields an empty map.
    pub(crate) fn from_urlencoded(input: &[u8]) -> Self {
        let mut params = Self::new();
        if let Ok(pairs) = serde_urlencoded::from_bytes::<Vec<(String, String)>>(input) {
            for (k, v) in pairs {
                params.insert_first(k, v);
            }
        }
        params
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert_first(k, v);
        }
        params
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Params {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        iter.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect()
    }
}
