use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub photos_dir: PathBuf,
    pub collections_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub log_level: String,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub r2: R2Config,
}

/// Which object store `mirror` and `remote list` talk to.
#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    /// `r2` or `directory`.
    pub backend: String,
    pub directory: Option<PathBuf>,
    pub page_size: usize,
}

/// Credentials for a Cloudflare R2 (S3-compatible) bucket, normally read from
/// the `[r2]` section of `.r2config`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct R2Config {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub endpoint: Option<String>,
    pub region: String,
}

impl Default for R2Config {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket_name: String::new(),
            endpoint: None,
            region: "auto".into(),
        }
    }
}

impl R2Config {
    /// Names of the required keys that are still empty.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        [
            ("account_id", &self.account_id),
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
            ("bucket_name", &self.bucket_name),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect()
    }
}

impl AppConfig {
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let in_root = |name: &str| project_root.join(name).to_string_lossy().into_owned();

        let s = Config::builder()
            .set_default("photos_dir", "photos")?
            .set_default("collections_dir", "data/collections")?
            .set_default("metadata_dir", "data/photos")?
            .set_default("log_level", "info")?
            .set_default("remote.backend", "r2")?
            .set_default("remote.page_size", 1000)?
            .add_source(File::with_name(&in_root("config/default")).required(false))
            .add_source(File::with_name(&in_root(&format!("config/{}", env))).required(false))
            .add_source(File::with_name(&in_root("config/local")).required(false))
            .add_source(File::new(&in_root(".r2config"), FileFormat::Ini).required(false))
            .add_source(Environment::with_prefix("PHOTO_PIPELINE").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        Ok(config.rooted_at(project_root))
    }

    fn rooted_at(mut self, root: &Path) -> Self {
        let anchor = |path: PathBuf| if path.is_relative() { root.join(path) } else { path };
        self.photos_dir = anchor(self.photos_dir);
        self.collections_dir = anchor(self.collections_dir);
        self.metadata_dir = anchor(self.metadata_dir);
        self.remote.directory = self.remote.directory.map(anchor);
        self
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.photos_dir.join(crate::walker::EXPORTS_DIR)
    }

    pub fn collection_file(&self, name: &str) -> PathBuf {
        self.collections_dir.join(format!("{}.yaml", name))
    }
}
