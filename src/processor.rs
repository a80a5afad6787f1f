use crate::error::AppError;
use crate::metadata::{self, PhotoMetadata};
use crate::walker::{self, IMAGE_EXTENSIONS};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk form of one photo's metadata: the photo's path relative to the
/// photo root, followed by every metadata field.
#[derive(Debug, Serialize)]
struct MetadataDocument<'a> {
    path: &'a str,
    #[serde(flatten)]
    metadata: &'a PhotoMetadata,
}

#[derive(Debug, Default)]
pub struct GenerateReport {
    pub cleared_existing: bool,
    /// YAML files written (or that would be written on a dry run).
    pub created: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, AppError)>,
}

pub fn render_document(relative: &str, metadata: &PhotoMetadata) -> Result<String, AppError> {
    Ok(serde_yaml::to_string(&MetadataDocument { path: relative, metadata })?)
}

/// Regenerates `data_dir` as a mirror of `photos_dir`, one YAML file per
/// photo. The previous tree is removed first so deleted photos leave no
/// stale files behind.
pub fn generate_metadata_files(photos_dir: &Path, data_dir: &Path, dry_run: bool) -> Result<GenerateReport, AppError> {
    log::info!("Generating metadata files from {:?} into {:?}", photos_dir, data_dir);
    let photos = walker::collect_images(photos_dir, IMAGE_EXTENSIONS)?;
    log::info!("Found {} photos to process", photos.len());

    let mut report = GenerateReport::default();
    if data_dir.exists() {
        log::debug!("Deleting existing metadata files under {:?}", data_dir);
        if !dry_run {
            fs::remove_dir_all(data_dir)?;
        }
        report.cleared_existing = true;
    }

    for photo in photos {
        let Some(relative) = walker::relative_key(photos_dir, &photo) else {
            continue;
        };
        let yaml_path = data_dir.join(&relative).with_extension("yaml");

        match process_photo(&photo, &relative, &yaml_path, dry_run) {
            Ok(()) => {
                log::debug!("Wrote {:?}", yaml_path);
                report.created.push(yaml_path);
            }
            Err(e) => {
                log::warn!("Failed to write metadata for {}: {}", relative, e);
                report.errors.push((photo, e));
            }
        }
    }

    log::info!(
        "Metadata generation finished: {} created, {} errors",
        report.created.len(),
        report.errors.len()
    );
    Ok(report)
}

fn process_photo(photo: &Path, relative: &str, yaml_path: &Path, dry_run: bool) -> Result<(), AppError> {
    let metadata = metadata::extract(photo)?;
    let document = render_document(relative, &metadata)?;
    if dry_run {
        return Ok(());
    }
    if let Some(parent) = yaml_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(yaml_path, document)?;
    Ok(())
}
