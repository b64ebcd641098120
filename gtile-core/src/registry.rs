//! Dataset lookup and coordinate-system catalogs

use crate::coords::ChromSizes;
use crate::types::DatasetDescriptor;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Maps opaque dataset uids to descriptors
#[async_trait]
pub trait Registry: Send + Sync {
    async fn get(&self, uid: &str) -> Option<DatasetDescriptor>;
    async fn list(&self) -> Vec<DatasetDescriptor>;
}

/// Named coordinate systems
#[async_trait]
pub trait ChromsizesCatalog: Send + Sync {
    async fn get(&self, name: &str) -> Option<Arc<ChromSizes>>;
}

/// Fixed set of datasets, listed in uid order
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    entries: BTreeMap<String, DatasetDescriptor>,
}

impl StaticRegistry {
    pub fn new<I: IntoIterator<Item = DatasetDescriptor>>(entries: I) -> Self {
        Self {
            entries: entries.into_iter().map(|d| (d.uid.clone(), d)).collect(),
        }
    }

    pub fn insert(&mut self, descriptor: DatasetDescriptor) {
        self.entries.insert(descriptor.uid.clone(), descriptor);
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn get(&self, uid: &str) -> Option<DatasetDescriptor> {
        self.entries.get(uid).cloned()
    }

    async fn list(&self) -> Vec<DatasetDescriptor> {
        self.entries.values().cloned().collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    systems: HashMap<String, Arc<ChromSizes>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, chromsizes: ChromSizes) {
        self.systems.insert(name.into(), Arc::new(chromsizes));
    }
}

#[async_trait]
impl ChromsizesCatalog for StaticCatalog {
    async fn get(&self, name: &str) -> Option<Arc<ChromSizes>> {
        self.systems.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileType;

    #[tokio::test]
    async fn test_static_registry() {
        let registry = StaticRegistry::new([
            DatasetDescriptor::new("b", FileType::Hitile, "/data/b.hitile"),
            DatasetDescriptor::new("a", FileType::Cooler, "/data/a.mcool"),
        ]);
        assert_eq!(registry.get("a").await.unwrap().filetype, FileType::Cooler);
        assert!(registry.get("c").await.is_none());
        let uids: Vec<String> = registry.list().await.into_iter().map(|d| d.uid).collect();
        assert_eq!(uids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_static_catalog() {
        let mut catalog = StaticCatalog::new();
        catalog.insert("hg19", ChromSizes::new([("chr1", 100u64)]));
        assert_eq!(catalog.get("hg19").await.unwrap().total_length(), 100);
        assert!(catalog.get("mm10").await.is_none());
    }
}
