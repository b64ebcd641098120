//! Configuration handling for the gtile CLI
//!
//! Datasets, coordinate systems and engine limits come from a gtile.toml
//! file; command-line flags override individual values.

use crate::error::{CliError, CliResult};
use anyhow::{Context, Result};
use gtile_core::{ChromSizes, DatasetDescriptor, EngineConfig, FileType, StaticCatalog, StaticRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,

    #[serde(default)]
    pub chromsizes: Vec<ChromsizesEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Worker threads for the runtime and the read pool
    #[serde(default = "default_threads")]
    pub threads: usize,
}

/// One registered dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub uid: String,
    pub filetype: FileType,
    pub path: PathBuf,

    /// Name of a `[[chromsizes]]` entry to order chromosomes by
    #[serde(default, alias = "coordSystem", skip_serializing_if = "Option::is_none")]
    pub coord_system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A named coordinate system read from a two-column TSV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromsizesEntry {
    pub name: String,
    pub path: PathBuf,
}

fn default_threads() -> usize { num_cpus::get() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { threads: default_threads() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            engine: EngineConfig::default(),
            datasets: Vec::new(),
            chromsizes: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from("gtile.toml");
                if default_path.exists() {
                    log::info!("Loading configuration from: gtile.toml");
                    Self::load_from_file(&default_path)?
                } else {
                    log::info!("Using default configuration");
                    Self::default()
                }
            }
        };

        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Example configuration with one dataset of each common kind
    pub fn example() -> Self {
        Self {
            datasets: vec![
                DatasetEntry {
                    uid: "hic-mcool".to_string(),
                    filetype: FileType::Cooler,
                    path: PathBuf::from("data/sample.mcool"),
                    coord_system: Some("hg38".to_string()),
                    datatype: Some("matrix".to_string()),
                    name: Some("Sample contact matrix".to_string()),
                },
                DatasetEntry {
                    uid: "genes".to_string(),
                    filetype: FileType::Beddb,
                    path: PathBuf::from("data/genes.beddb"),
                    coord_system: None,
                    datatype: None,
                    name: None,
                },
            ],
            chromsizes: vec![ChromsizesEntry {
                name: "hg38".to_string(),
                path: PathBuf::from("data/hg38.chrom.sizes"),
            }],
            ..Self::default()
        }
    }

    pub fn example_toml() -> CliResult<String> {
        Ok(toml::to_string_pretty(&Self::example())?)
    }

    /// Registry of the configured datasets; uids must be unique
    pub fn registry(&self) -> CliResult<StaticRegistry> {
        let mut registry = StaticRegistry::default();
        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.datasets {
            if !seen.insert(entry.uid.as_str()) {
                return Err(CliError::config(format!("Dataset uid '{}' is registered twice", entry.uid)));
            }
            let mut descriptor = DatasetDescriptor::new(entry.uid.clone(), entry.filetype, entry.path.clone());
            if let Some(system) = &entry.coord_system {
                descriptor = descriptor.with_coord_system(system.clone());
            }
            descriptor.datatype = entry.datatype.clone();
            descriptor.name = entry.name.clone();
            registry.insert(descriptor);
        }
        Ok(registry)
    }

    /// Read every configured coordinate system
    pub fn catalog(&self) -> CliResult<StaticCatalog> {
        let mut catalog = StaticCatalog::new();
        for entry in &self.chromsizes {
            if !entry.path.exists() {
                return Err(CliError::file_not_found(entry.path.clone()));
            }
            let content = std::fs::read_to_string(&entry.path)?;
            let sizes = ChromSizes::from_tsv(&content)?;
            log::debug!("Coordinate system '{}' has {} chromosomes", entry.name, sizes.len());
            catalog.insert(entry.name.clone(), sizes);
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.general.threads >= 1);
        assert_eq!(config.engine.max_fragment_dims, 1024);
        assert!(config.datasets.is_empty());
    }

    #[test]
    fn test_config_roundtrip() -> Result<()> {
        let config = Config::example();
        let temp_file = NamedTempFile::new()?;

        config.save_to_file(temp_file.path())?;
        let loaded = Config::load_from_file(temp_file.path())?;

        assert_eq!(loaded.datasets.len(), 2);
        assert_eq!(loaded.datasets[0].filetype, FileType::Cooler);
        assert_eq!(loaded.datasets[0].coord_system.as_deref(), Some("hg38"));
        assert_eq!(loaded.engine, config.engine);

        Ok(())
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            max_fragment_dims = 64

            [[datasets]]
            uid = "t"
            filetype = "hitile"
            path = "t.hitile"
            coordSystem = "hg19"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.max_fragment_dims, 64);
        assert_eq!(config.engine.pixel_budget_tiles, EngineConfig::default().pixel_budget_tiles);
        assert_eq!(config.datasets[0].filetype, FileType::Hitile);
        assert_eq!(config.datasets[0].coord_system.as_deref(), Some("hg19"));
    }

    #[test]
    fn test_duplicate_uids_are_rejected() {
        let mut config = Config::example();
        config.datasets.push(config.datasets[0].clone());
        assert!(matches!(config.registry(), Err(CliError::Config { .. })));
    }

    #[test]
    fn test_catalog_reads_chromsizes() -> Result<()> {
        let sizes = NamedTempFile::new()?;
        std::fs::write(sizes.path(), "chr1\t1000\nchr2\t500\n")?;
        let config = Config {
            chromsizes: vec![ChromsizesEntry { name: "tiny".into(), path: sizes.path().to_path_buf() }],
            ..Config::default()
        };
        config.catalog()?;

        let missing = Config {
            chromsizes: vec![ChromsizesEntry { name: "gone".into(), path: PathBuf::from("/nonexistent/sizes") }],
            ..Config::default()
        };
        assert!(matches!(missing.catalog(), Err(CliError::FileNotFound { .. })));
        Ok(())
    }

    #[test]
    fn test_example_toml_generation() {
        let example = Config::example_toml().unwrap();
        assert!(example.contains("[general]"));
        assert!(example.contains("[engine]"));
        assert!(example.contains("[[datasets]]"));
        assert!(example.contains("[[chromsizes]]"));
    }
}
