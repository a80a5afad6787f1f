use crate::error::AppError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Staging directory under the photo root for unorganized exports.
pub const EXPORTS_DIR: &str = "exports";

pub const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Slash-joined path of `path` relative to `root`, independent of the host separator.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Recursively collects images under `root`, skipping any `exports` staging
/// directory. Results are sorted by path.
pub fn collect_images(root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, AppError> {
    if !root.is_dir() {
        return Err(AppError::NotFound(format!("photos directory {}", root.display())));
    }
    log::debug!("Collecting {:?} files under {:?}", extensions, root);

    let mut found = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() > 0 && e.file_type().is_dir() && e.file_name() == EXPORTS_DIR));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            log::trace!("Discovered image: {:?}", entry.path());
            found.push(entry.into_path());
        }
    }

    found.sort();
    log::debug!("Collected {} images under {:?}", found.len(), root);
    Ok(found)
}

/// Images directly inside `dir` (no recursion), sorted by file name.
pub fn list_images(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, AppError> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, extensions) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn collect_images_skips_exports_and_other_extensions() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("2025/washington/seattle/b.jpg"));
        touch(&root.path().join("2024/unknown-location/a.JPEG"));
        touch(&root.path().join("exports/incoming.jpg"));
        touch(&root.path().join("2025/notes.txt"));
        touch(&root.path().join("2025/scan.png"));

        let found: Vec<String> = collect_images(root.path(), JPEG_EXTENSIONS)
            .unwrap()
            .iter()
            .map(|p| relative_key(root.path(), p).unwrap())
            .collect();

        assert_eq!(
            found,
            vec!["2024/unknown-location/a.JPEG", "2025/washington/seattle/b.jpg"]
        );
    }

    #[test]
    fn collect_images_requires_existing_root() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope");
        assert!(matches!(
            collect_images(&missing, JPEG_EXTENSIONS),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn list_images_is_flat_and_sorted() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("z.gif"));
        touch(&root.path().join("a.jpg"));
        touch(&root.path().join("nested/c.jpg"));

        let names: Vec<String> = list_images(root.path(), IMAGE_EXTENSIONS)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "z.gif"]);
    }

    #[test]
    fn relative_key_uses_forward_slashes() {
        let root = Path::new("/photos");
        assert_eq!(
            relative_key(root, Path::new("/photos/2025/seattle/x.jpg")).as_deref(),
            Some("2025/seattle/x.jpg")
        );
        assert_eq!(relative_key(root, Path::new("/elsewhere/x.jpg")), None);
        assert_eq!(relative_key(root, root), None);
    }
}
