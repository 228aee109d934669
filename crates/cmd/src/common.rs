use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use odm::{Store, StoreConfig};

pub const STORE_ENV: &str = "ODM_STORE";
pub const CONFIG_ENV: &str = "ODM_CONFIG";

/// Where the store lives and how it is configured, resolved from flags
/// with environment fallbacks.
#[derive(Debug, Clone, Default)]
pub struct StoreContext {
    pub store_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

impl StoreContext {
    #[must_use]
    pub fn new(store_path: Option<PathBuf>, config_path: Option<PathBuf>) -> Self {
        Self {
            store_path: store_path.or_else(|| env::var_os(STORE_ENV).map(PathBuf::from)),
            config_path: config_path.or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from)),
        }
    }

    /// The configuration file's contents (or defaults) with the store path
    /// override applied.
    pub fn config(&self) -> Result<StoreConfig> {
        let mut config = match &self.config_path {
            Some(path) => odm::load_config(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => StoreConfig::default(),
        };
        if let Some(path) = &self.store_path {
            config.path = Some(path.clone());
        }
        Ok(config)
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        self.config()?.path.ok_or_else(|| {
            anyhow!("No store given: pass --store, set {STORE_ENV}, or set path in the config")
        })
    }

    /// Open an existing store.
    pub fn open_store(&self) -> Result<Store> {
        let path = self.store_path()?;
        if !path.exists() {
            return Err(anyhow!(
                "No store at {}; run 'odm init' first",
                path.display()
            ));
        }
        self.open_at(&path)
    }

    pub(crate) fn open_at(&self, path: &Path) -> Result<Store> {
        let mut config = self.config()?;
        config.path = Some(path.to_path_buf());
        Store::open(&config).with_context(|| format!("Failed to open store {}", path.display()))
    }
}
