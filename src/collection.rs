//! Collection files: a titled, ordered list of photos with an optional
//! filter that makes the collection computed rather than curated.
//!
//! Persistence is load, mutate in memory, overwrite. There is no atomic
//! rename, so a crash mid-write can truncate the file.

use crate::error::AppError;
use crate::filter::FilterSpec;
use crate::metadata;
use crate::walker::{self, JPEG_EXTENSIONS};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Mapping;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPhoto {
    pub path: String,
    #[serde(default, deserialize_with = "nullable")]
    pub caption: String,
    #[serde(default, deserialize_with = "nullable")]
    pub alt: String,
    /// Hand-added keys such as `credit:`, written back untouched.
    #[serde(default, flatten)]
    pub extra: Mapping,
}

impl CollectionPhoto {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            caption: String::new(),
            alt: String::new(),
            extra: Mapping::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub cover_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterSpec>,
    #[serde(default, deserialize_with = "nullable")]
    pub photos: Vec<CollectionPhoto>,
    #[serde(default, flatten)]
    pub extra: Mapping,
}

/// `key:` with no value reads as the type's default instead of failing.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSync {
    /// No filters: a manual collection, left untouched.
    Skipped,
    Synced { before: usize, after: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectorySync {
    pub added: usize,
    pub removed: usize,
    pub cover_updated: bool,
}

/// "street-photography" -> "Street Photography".
pub fn title_from_name(name: &str) -> String {
    let mut title = String::with_capacity(name.len());
    let mut prev_is_letter = false;
    for c in name.replace('-', " ").chars() {
        if prev_is_letter {
            title.extend(c.to_lowercase());
        } else {
            title.extend(c.to_uppercase());
        }
        prev_is_letter = c.is_alphabetic();
    }
    title
}

impl Collection {
    pub fn new(name: &str, description: &str, filters: Option<FilterSpec>) -> Self {
        Self {
            title: title_from_name(name),
            description: description.to_string(),
            cover_path: String::new(),
            filters,
            photos: Vec::new(),
            extra: Mapping::new(),
        }
    }

    fn read(path: &Path) -> Result<Option<Self>, AppError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!("collection file {}", path.display())));
            }
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_yaml::from_str(&contents)?))
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        Self::read(path)?
            .ok_or_else(|| AppError::Generic(format!("invalid collection file {}", path.display())))
    }

    /// `None` when the file is missing or empty.
    pub fn load_existing(path: &Path) -> Result<Option<Self>, AppError> {
        match Self::read(path) {
            Err(AppError::NotFound(_)) => Ok(None),
            other => other,
        }
    }

    /// Loads the collection at `path`, or starts a new manual one named after
    /// `name` if the file is missing or empty.
    pub fn load_or_create(path: &Path, name: &str) -> Result<Self, AppError> {
        Ok(Self::load_existing(path)?.unwrap_or_else(|| {
            log::debug!("Starting new collection '{}' at {:?}", name, path);
            Self::new(name, "", None)
        }))
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        log::debug!("Saved collection with {} photos to {:?}", self.photos.len(), path);
        Ok(())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.photos.iter().any(|p| p.path == path)
    }

    /// Appends `path` unless already present. The first photo added to an
    /// empty collection becomes its cover.
    pub fn add_photo(&mut self, path: &str) -> bool {
        if self.contains(path) {
            return false;
        }
        self.photos.push(CollectionPhoto::new(path));
        if self.photos.len() == 1 {
            self.cover_path = path.to_string();
        }
        true
    }

    pub fn is_filtered(&self) -> bool {
        self.filters.as_ref().map(|f| !f.is_empty()).unwrap_or(false)
    }

    /// Rebuilds the member list from every JPEG under `photos_root` that the
    /// collection's filters match. Captions and alt text are reset.
    ///
    /// An existing cover is kept while there are matches, even if it no
    /// longer matches itself; with no matches the cover is cleared.
    pub fn sync_with_filters(&mut self, photos_root: &Path) -> Result<FilterSync, AppError> {
        let Some(spec) = self.filters.as_ref().filter(|f| !f.is_empty()) else {
            return Ok(FilterSync::Skipped);
        };
        let filter = spec.compile()?;

        let mut matching = Vec::new();
        for path in walker::collect_images(photos_root, JPEG_EXTENSIONS)? {
            let metadata = match metadata::extract(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    log::warn!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };
            if filter.matches(&metadata) {
                if let Some(key) = walker::relative_key(photos_root, &path) {
                    log::trace!("Filter matched {}", key);
                    matching.push(key);
                }
            }
        }
        matching.sort();

        let before = self.photos.len();
        self.photos = matching.iter().map(CollectionPhoto::new).collect();

        match matching.first() {
            Some(first) if self.cover_path.is_empty() => self.cover_path = first.clone(),
            Some(_) => {}
            None => self.cover_path.clear(),
        }

        Ok(FilterSync::Synced {
            before,
            after: self.photos.len(),
        })
    }

    /// Mirrors the contents of the single folder `photos/<name>/`: members
    /// whose file is gone are dropped, new files are appended in `files`
    /// order. A cover that no longer names a member falls back to the first
    /// remaining photo, or is cleared.
    pub fn sync_with_directory(&mut self, name: &str, files: &[String]) -> DirectorySync {
        let current: Vec<String> = files.iter().map(|f| format!("{}/{}", name, f)).collect();
        let cover_missing = !self.cover_path.is_empty() && !current.contains(&self.cover_path);

        let before = self.photos.len();
        self.photos.retain(|photo| current.contains(&photo.path));
        let removed = before - self.photos.len();

        let mut added = 0;
        for path in &current {
            if !self.contains(path) {
                self.photos.push(CollectionPhoto::new(path.as_str()));
                added += 1;
            }
        }

        let mut cover_updated = false;
        if cover_missing {
            self.cover_path = self
                .photos
                .first()
                .map(|photo| photo.path.clone())
                .unwrap_or_default();
            cover_updated = true;
        }

        DirectorySync {
            added,
            removed,
            cover_updated,
        }
    }
}

/// Converts a user-supplied photo path into its key relative to
/// `photos_root`. The file must exist and live inside the root.
pub fn photo_key(input: &Path, photos_root: &Path) -> Result<String, AppError> {
    let root = photos_root
        .canonicalize()
        .map_err(|_| AppError::NotFound(format!("photos directory {}", photos_root.display())))?;
    let resolved = input
        .canonicalize()
        .map_err(|_| AppError::NotFound(format!("{} - file not found", input.display())))?;
    walker::relative_key(&root, &resolved).ok_or_else(|| AppError::OutsideRoot(input.display().to_string()))
}
