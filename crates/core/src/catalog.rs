// Capability descriptors and the per-session catalog that indexes them.

use crate::schema::InputSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tool advertised by a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: InputSchema,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A readable resource advertised by a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl ResourceDescriptor {
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: description.into(),
            mime_type: "application/json".to_string(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// The `<servertype>` part of a `<servertype>://<path>` uri.
    pub fn scheme(&self) -> Option<&str> {
        self.uri.split_once("://").map(|(scheme, _)| scheme)
    }
}

/// Anything a catalog can index.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for ToolDescriptor {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Keyed for ResourceDescriptor {
    fn key(&self) -> &str {
        &self.uri
    }
}

/// Descriptors in advertised order with constant-time lookup by key.
///
/// A later descriptor with a duplicate key replaces the earlier one.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog<T> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: Keyed> Catalog<T> {
    pub fn new(descriptors: Vec<T>) -> Self {
        let mut entries: Vec<T> = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            match index.get(descriptor.key()) {
                Some(&position) => entries[position] = descriptor,
                None => {
                    index.insert(descriptor.key().to_string(), entries.len());
                    entries.push(descriptor);
                }
            }
        }

        Self { entries, index }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&position| &self.entries[position])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(Keyed::key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Keyed> Default for Catalog<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
