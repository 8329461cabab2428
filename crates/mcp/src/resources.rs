// Resource readers and the uri -> reader registry

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tether_core::ResourceDescriptor;

#[async_trait::async_trait]
pub trait ResourceReader: Send + Sync {
    fn descriptor(&self) -> ResourceDescriptor;

    async fn read(&self) -> Result<Value>;
}

/// A resource whose content comes from a plain function.
pub struct FnResource<F> {
    descriptor: ResourceDescriptor,
    reader: F,
}

impl<F> FnResource<F>
where
    F: Fn() -> Result<Value> + Send + Sync + 'static,
{
    pub fn new(descriptor: ResourceDescriptor, reader: F) -> Self {
        Self { descriptor, reader }
    }
}

#[async_trait::async_trait]
impl<F> ResourceReader for FnResource<F>
where
    F: Fn() -> Result<Value> + Send + Sync + 'static,
{
    fn descriptor(&self) -> ResourceDescriptor {
        self.descriptor.clone()
    }

    async fn read(&self) -> Result<Value> {
        (self.reader)()
    }
}

#[derive(Default)]
pub struct ResourceRegistry {
    readers: HashMap<String, (ResourceDescriptor, Arc<dyn ResourceReader>)>,
    order: Vec<String>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reader: Arc<dyn ResourceReader>) {
        let descriptor = reader.descriptor();
        let uri = descriptor.uri.clone();
        if !self.readers.contains_key(&uri) {
            self.order.push(uri.clone());
        }
        self.readers.insert(uri, (descriptor, reader));
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn ResourceReader>> {
        self.readers.get(uri).map(|(_, reader)| reader.clone())
    }

    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        self.order
            .iter()
            .filter_map(|uri| self.readers.get(uri))
            .map(|(descriptor, _)| descriptor.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}
