//! Moves exported photos from the staging directory into the
//! `<year>/<state>/<city>/` tree, deriving each segment from metadata.

use crate::collection::Collection;
use crate::error::AppError;
use crate::metadata::{self, PhotoMetadata};
use crate::walker::{self, IMAGE_EXTENSIONS};
use std::fs;
use std::path::{Path, PathBuf};

pub const UNKNOWN_YEAR: &str = "unknown-year";
pub const UNKNOWN_LOCATION: &str = "unknown-location";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Slash-joined, relative to the photo root.
    pub relative: String,
    pub absolute: PathBuf,
    /// A file already sits at the destination.
    pub replaces: bool,
}

/// Year from a camera date such as `2025:10:18 22:33:24` or `2025-10-18`.
pub fn extract_year(date: Option<&str>) -> Option<String> {
    let first = date?.split(':').next()?.split('-').next()?;
    (first.len() == 4 && first.chars().all(|c| c.is_ascii_digit())).then(|| first.to_string())
}

/// Lowercases and turns every run of characters other than alphanumerics,
/// `-` and `_` into a single hyphen. Returns `None` if nothing is left.
pub fn sanitize(segment: &str) -> Option<String> {
    let replaced: String = segment
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let collapsed = replaced
        .split('-')
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Computes where a photo belongs: `<root>/<year>/<state>/<city>/<file_name>`.
/// Sublocation and country never take part.
pub fn resolve_destination(metadata: &PhotoMetadata, photos_root: &Path, file_name: &str) -> Destination {
    let year = extract_year(metadata.date.as_deref()).unwrap_or_else(|| UNKNOWN_YEAR.to_string());

    let mut segments = vec![year];
    let location_segments: Vec<String> = metadata
        .location
        .iter()
        .flat_map(|l| [l.state.as_deref(), l.city.as_deref()])
        .flatten()
        .filter_map(sanitize)
        .collect();
    if location_segments.is_empty() {
        segments.push(UNKNOWN_LOCATION.to_string());
    } else {
        segments.extend(location_segments);
    }
    segments.push(file_name.to_string());

    let relative = segments.join("/");
    let absolute = segments.iter().fold(photos_root.to_path_buf(), |path, s| path.join(s));
    let replaces = absolute.exists();
    Destination {
        relative,
        absolute,
        replaces,
    }
}

fn file_name_of(path: &Path) -> Result<String, AppError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::Generic(format!("{} has no file name", path.display())))
}

fn move_file(from: &Path, to: &Path) -> Result<(), AppError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // rename fails across filesystems; fall back to copy + remove.
    fs::copy(from, to)?;
    fs::remove_file(from)?;
    Ok(())
}

/// Resolves and, unless `dry_run`, moves one photo into place.
pub fn ingest_photo(photo: &Path, photos_root: &Path, dry_run: bool) -> Result<Destination, AppError> {
    let metadata = metadata::extract(photo)?;
    let destination = resolve_destination(&metadata, photos_root, &file_name_of(photo)?);

    if dry_run {
        log::debug!("Dry run: {:?} -> {}", photo, destination.relative);
        return Ok(destination);
    }

    if let Some(dir) = destination.absolute.parent() {
        fs::create_dir_all(dir)?;
    }
    move_file(photo, &destination.absolute)?;
    log::info!("Moved {:?} to {}", photo, destination.relative);
    Ok(destination)
}

#[derive(Debug)]
pub struct IngestItem {
    pub file_name: String,
    pub result: Result<Destination, AppError>,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    /// False when the staging directory had to be created.
    pub exports_existed: bool,
    pub items: Vec<IngestItem>,
}

impl IngestReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn replaced(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(&i.result, Ok(d) if d.replaces))
            .count()
    }
}

/// Ingests every image in `<root>/exports`, in file name order. Per-photo
/// failures are recorded and do not stop the run.
pub fn ingest_exports(photos_root: &Path, dry_run: bool) -> Result<IngestReport, AppError> {
    let exports = photos_root.join(walker::EXPORTS_DIR);
    if !exports.is_dir() {
        log::info!("Creating missing exports directory {:?}", exports);
        fs::create_dir_all(&exports)?;
        return Ok(IngestReport::default());
    }

    let mut report = IngestReport {
        exports_existed: true,
        items: Vec::new(),
    };
    for photo in walker::list_images(&exports, IMAGE_EXTENSIONS)? {
        let result = ingest_photo(&photo, photos_root, dry_run);
        if let Err(e) = &result {
            log::warn!("Failed to ingest {:?}: {}", photo, e);
        }
        report.items.push(IngestItem {
            file_name: file_name_of(&photo)?,
            result,
        });
    }
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportAction {
    /// Already in the tree; the export copy was deleted.
    AlreadyIngested { relative: String, added: bool },
    Ingested { relative: String, added: bool },
}

#[derive(Debug)]
pub struct ExportItem {
    pub file_name: String,
    pub result: Result<ExportAction, AppError>,
}

#[derive(Debug, Default)]
pub struct ExportReport {
    pub items: Vec<ExportItem>,
}

impl ExportReport {
    pub fn added(&self) -> usize {
        self.items
            .iter()
            .filter(|i| {
                matches!(
                    &i.result,
                    Ok(ExportAction::AlreadyIngested { added: true, .. } | ExportAction::Ingested { added: true, .. })
                )
            })
            .count()
    }

    pub fn errors(&self) -> usize {
        self.items.iter().filter(|i| i.result.is_err()).count()
    }
}

/// Adds every exported photo to `collection`. Photos whose destination
/// already exists are not moved again: the export copy is deleted and the
/// existing file is referenced instead.
pub fn ingest_into_collection(photos_root: &Path, collection: &mut Collection) -> Result<ExportReport, AppError> {
    let exports = photos_root.join(walker::EXPORTS_DIR);
    if !exports.is_dir() {
        return Err(AppError::NotFound(format!("exports directory {}", exports.display())));
    }

    let mut report = ExportReport::default();
    for photo in walker::list_images(&exports, IMAGE_EXTENSIONS)? {
        let result = export_one(&photo, photos_root, collection);
        report.items.push(ExportItem {
            file_name: file_name_of(&photo)?,
            result,
        });
    }
    Ok(report)
}

fn export_one(photo: &Path, photos_root: &Path, collection: &mut Collection) -> Result<ExportAction, AppError> {
    let planned = ingest_photo(photo, photos_root, true)?;
    if planned.replaces {
        let added = collection.add_photo(&planned.relative);
        if let Err(e) = fs::remove_file(photo) {
            log::warn!("Could not delete {:?} from exports: {}", photo, e);
        }
        return Ok(ExportAction::AlreadyIngested {
            relative: planned.relative,
            added,
        });
    }

    let destination = ingest_photo(photo, photos_root, false)?;
    let added = collection.add_photo(&destination.relative);
    Ok(ExportAction::Ingested {
        relative: destination.relative,
        added,
    })
}
