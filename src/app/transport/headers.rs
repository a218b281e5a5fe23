//! Immutable request header set
//!
//! Header names are kept exactly as supplied and sent in insertion order.
//! Every modification builds a new value, so a set handed to one request can
//! never be changed underneath it by another.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::errors::{TransportError, TransportResult};

/// Ordered request headers with case-preserving names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// New set with `name` set to `value`
    ///
    /// An existing entry with the same name (ignoring ASCII case) is replaced
    /// in place and takes the new spelling.
    pub fn with(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        let mut entries = self.entries.clone();
        match entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => entries.push((name, value)),
        }
        Self { entries }
    }

    /// New set without `name`
    pub fn without(&self, name: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(existing, _)| !existing.eq_ignore_ascii_case(name))
                .cloned()
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert to the wire representation
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidHeader` if a name or value cannot be
    /// framed as an HTTP header.
    pub fn to_header_map(&self) -> TransportResult<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| TransportError::InvalidHeader {
                    name: name.clone(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| TransportError::InvalidHeader {
                    name: name.clone(),
                })?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |set, (name, value)| set.with(name, value))
    }
}
