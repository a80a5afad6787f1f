use crate::config::AppConfig;
use crate::error::AppError;
use crate::store::{ObjectPage, ObjectStore, RemoteObject};
use crate::walker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// A plain directory used as a bucket, e.g. a mounted bucket or a local
/// staging copy. Keys are slash-joined paths below the root.
pub struct DirectoryStore {
    root: PathBuf,
    page_size: usize,
}

impl DirectoryStore {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let root = config.remote.directory.clone().ok_or_else(|| {
            AppError::Config(config::ConfigError::Message(
                "remote.directory must be set for the directory backend".into(),
            ))
        })?;
        Ok(Self::at(root, config.remote.page_size))
    }

    pub fn at(root: PathBuf, page_size: usize) -> Self {
        log::debug!("Using directory store at {:?} (page size {})", root, page_size);
        Self {
            root,
            page_size: page_size.max(1),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(key);
        if key.is_empty() || relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(AppError::Generic(format!("invalid object key {:?}", key)));
        }
        Ok(self.root.join(relative))
    }
}

fn list_sorted(root: &Path, prefix: &str) -> Result<Vec<RemoteObject>, AppError> {
    let mut objects = Vec::new();
    if !root.is_dir() {
        return Ok(objects);
    }
    for entry in WalkDir::new(root).into_iter() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(key) = walker::relative_key(root, entry.path()) else {
            continue;
        };
        if !key.starts_with(prefix) {
            continue;
        }
        let stat = entry.metadata()?;
        objects.push(RemoteObject {
            key,
            size: stat.len(),
            last_modified: DateTime::<Utc>::from(stat.modified()?),
        });
    }
    objects.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(objects)
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ObjectPage, AppError> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        let all = tokio::task::spawn_blocking(move || list_sorted(&root, &prefix)).await??;

        let mut remaining: Vec<RemoteObject> = all
            .into_iter()
            .filter(|o| continuation.as_deref().map(|after| o.key.as_str() > after).unwrap_or(true))
            .collect();
        let next = if remaining.len() > self.page_size {
            remaining.truncate(self.page_size);
            remaining.last().map(|o| o.key.clone())
        } else {
            None
        };
        log::trace!("Directory store page: {} objects, next {:?}", remaining.len(), next);
        Ok(ObjectPage {
            objects: remaining,
            next,
        })
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body).await?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Deleting an absent object succeeds, as it does on S3.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
