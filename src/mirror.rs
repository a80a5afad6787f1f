//! Makes a remote object store an exact copy of a local directory: new and
//! newer local files are uploaded, remote objects with no local file are
//! deleted.

use crate::error::AppError;
use crate::store::ObjectStore;
use crate::walker;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub stat: FileStat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadReason {
    New,
    Updated,
}

impl fmt::Display for UploadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadReason::New => write!(f, "new"),
            UploadReason::Updated => write!(f, "updated"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub upload: Vec<(String, UploadReason)>,
    pub delete: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.upload.is_empty() && self.delete.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct MirrorReport {
    pub uploaded: usize,
    pub deleted: usize,
    pub failures: Vec<(String, AppError)>,
}

/// `""` mirrors to the bucket root, anything else becomes `"<subdir>/"`.
pub fn normalize_prefix(subdir: &str) -> String {
    let trimmed = subdir.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Every regular file below `dir` whose name does not start with a dot,
/// keyed by `prefix` followed by its slash-joined relative path.
pub fn scan_local(dir: &Path, prefix: &str) -> Result<BTreeMap<String, LocalFile>, AppError> {
    if !dir.is_dir() {
        return Err(AppError::NotFound(format!("directory {}", dir.display())));
    }

    let mut files = BTreeMap::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let Some(relative) = walker::relative_key(dir, entry.path()) else {
            continue;
        };
        let meta = entry.metadata()?;
        files.insert(
            format!("{}{}", prefix, relative),
            LocalFile {
                path: entry.path().to_path_buf(),
                stat: FileStat {
                    size: meta.len(),
                    modified: DateTime::<Utc>::from(meta.modified()?),
                },
            },
        );
    }
    log::debug!("Scanned {} local files under {:?}", files.len(), dir);
    Ok(files)
}

/// Follows continuation tokens until the listing is exhausted.
pub async fn list_remote(store: &dyn ObjectStore, prefix: &str) -> Result<BTreeMap<String, FileStat>, AppError> {
    let mut objects = BTreeMap::new();
    let mut continuation = None;
    let mut pages = 0;
    loop {
        let page = store.list_page(prefix, continuation).await?;
        pages += 1;
        for object in page.objects {
            objects.insert(
                object.key,
                FileStat {
                    size: object.size,
                    modified: object.last_modified,
                },
            );
        }
        match page.next {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }
    log::debug!("Listed {} remote objects in {} pages", objects.len(), pages);
    Ok(objects)
}

/// Sizes are not compared: only a local modification time more than one
/// second newer than the remote one counts as an update.
pub fn diff(local: &BTreeMap<String, FileStat>, remote: &BTreeMap<String, FileStat>) -> SyncPlan {
    let tolerance = Duration::seconds(1);
    let mut plan = SyncPlan::default();

    for (key, stat) in local {
        match remote.get(key) {
            None => plan.upload.push((key.clone(), UploadReason::New)),
            Some(theirs) if stat.modified > theirs.modified + tolerance => {
                plan.upload.push((key.clone(), UploadReason::Updated))
            }
            Some(_) => {}
        }
    }
    plan.delete = remote
        .keys()
        .filter(|key| !local.contains_key(*key))
        .cloned()
        .collect();
    plan
}

pub fn local_stats(local: &BTreeMap<String, LocalFile>) -> BTreeMap<String, FileStat> {
    local.iter().map(|(key, file)| (key.clone(), file.stat)).collect()
}

/// Uploads then deletes, one operation at a time. A failed operation is
/// recorded and the rest of the batch still runs.
pub async fn execute(
    plan: &SyncPlan,
    local: &BTreeMap<String, LocalFile>,
    store: &dyn ObjectStore,
) -> MirrorReport {
    let mut report = MirrorReport::default();

    for (key, reason) in &plan.upload {
        let result = match local.get(key) {
            Some(file) => upload(store, key, &file.path).await,
            None => Err(AppError::NotFound(key.clone())),
        };
        match result {
            Ok(()) => {
                log::debug!("Uploaded {} [{}]", key, reason);
                report.uploaded += 1;
            }
            Err(e) => {
                log::error!("Error uploading {}: {}", key, e);
                report.failures.push((key.clone(), e));
            }
        }
    }

    for key in &plan.delete {
        match store.delete_object(key).await {
            Ok(()) => {
                log::debug!("Deleted {}", key);
                report.deleted += 1;
            }
            Err(e) => {
                log::error!("Error deleting {}: {}", key, e);
                report.failures.push((key.clone(), e));
            }
        }
    }

    report
}

async fn upload(store: &dyn ObjectStore, key: &str, path: &Path) -> Result<(), AppError> {
    let body = tokio::fs::read(path).await?;
    store.put_object(key, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectPage;
    use crate::store_clients::directory::DirectoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn at(secs: i64) -> FileStat {
        FileStat {
            size: 100,
            modified: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    fn map(entries: &[(&str, FileStat)]) -> BTreeMap<String, FileStat> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn prefix_normalization() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("dev"), "dev/");
        assert_eq!(normalize_prefix("2025/"), "2025/");
    }

    #[test]
    fn reasons_and_deletions() {
        let local = map(&[("a.jpg", at(0)), ("b.jpg", at(10)), ("c.jpg", at(0))]);
        let remote = map(&[("b.jpg", at(0)), ("c.jpg", at(0)), ("gone.jpg", at(0))]);

        let plan = diff(&local, &remote);
        assert_eq!(
            plan.upload,
            vec![
                ("a.jpg".to_string(), UploadReason::New),
                ("b.jpg".to_string(), UploadReason::Updated),
            ]
        );
        assert_eq!(plan.delete, vec!["gone.jpg".to_string()]);
        assert_eq!(UploadReason::Updated.to_string(), "updated");
    }

    #[test]
    fn one_second_tolerance_and_sizes_ignored() {
        let mut bigger = at(1);
        bigger.size = 999;
        let local = map(&[("a.jpg", bigger), ("b.jpg", at(2))]);
        let remote = map(&[("a.jpg", at(0)), ("b.jpg", at(0))]);

        let plan = diff(&local, &remote);
        assert_eq!(plan.upload, vec![("b.jpg".to_string(), UploadReason::Updated)]);
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn applying_a_plan_converges() {
        let local = map(&[("a.jpg", at(5)), ("dir/b.jpg", at(20))]);
        let mut remote = map(&[("dir/b.jpg", at(0)), ("old.jpg", at(0))]);

        let plan = diff(&local, &remote);
        assert_eq!(plan, diff(&local, &remote));

        for (key, _) in &plan.upload {
            remote.insert(key.clone(), local[key]);
        }
        for key in &plan.delete {
            remote.remove(key);
        }
        assert!(diff(&local, &remote).is_empty());
    }

    #[test]
    fn scan_skips_dotfiles_and_applies_prefix() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        fs::write(dir.path().join(".DS_Store"), b"x").unwrap();
        fs::write(dir.path().join("sub/b.jpg"), b"bb").unwrap();

        let files = scan_local(dir.path(), "dev/").unwrap();
        let keys: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["dev/a.jpg", "dev/sub/b.jpg"]);
        assert_eq!(files["dev/sub/b.jpg"].stat.size, 2);

        assert!(matches!(
            scan_local(&dir.path().join("missing"), ""),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mirrors_into_directory_store() {
        let local_dir = TempDir::new().unwrap();
        let bucket = TempDir::new().unwrap();
        fs::create_dir_all(local_dir.path().join("2025")).unwrap();
        fs::write(local_dir.path().join("2025/a.jpg"), b"aaa").unwrap();
        fs::write(local_dir.path().join("b.jpg"), b"b").unwrap();

        let store = DirectoryStore::at(bucket.path().to_path_buf(), 1);
        store.put_object("dev/stale.jpg", b"old".to_vec()).await.unwrap();
        store.put_object("keep/other.jpg", b"o".to_vec()).await.unwrap();

        let prefix = normalize_prefix("dev");
        let local = scan_local(local_dir.path(), &prefix).unwrap();
        let remote = list_remote(&store, &prefix).await.unwrap();
        assert_eq!(remote.len(), 1);

        let plan = diff(&local_stats(&local), &remote);
        assert_eq!(plan.upload.len(), 2);
        assert_eq!(plan.delete, vec!["dev/stale.jpg".to_string()]);

        let report = execute(&plan, &local, &store).await;
        assert_eq!(report.uploaded, 2);
        assert_eq!(report.deleted, 1);
        assert!(report.failures.is_empty());

        assert_eq!(fs::read(bucket.path().join("dev/2025/a.jpg")).unwrap(), b"aaa");
        assert!(!bucket.path().join("dev/stale.jpg").exists());
        assert!(bucket.path().join("keep/other.jpg").exists());

        let remote = list_remote(&store, &prefix).await.unwrap();
        assert!(diff(&local_stats(&local), &remote).is_empty());
    }

    struct FailingStore;

    #[async_trait]
    impl ObjectStore for FailingStore {
        fn describe(&self) -> String {
            "failing".into()
        }

        async fn list_page(&self, _prefix: &str, _continuation: Option<String>) -> Result<ObjectPage, AppError> {
            Ok(ObjectPage::default())
        }

        async fn put_object(&self, key: &str, _body: Vec<u8>) -> Result<(), AppError> {
            if key.starts_with("bad") {
                Err(AppError::Remote {
                    status: 500,
                    message: "internal".into(),
                })
            } else {
                Ok(())
            }
        }

        async fn delete_object(&self, _key: &str) -> Result<(), AppError> {
            Err(AppError::Remote {
                status: 403,
                message: "denied".into(),
            })
        }
    }

    #[tokio::test]
    async fn failures_do_not_abort_the_batch() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.jpg"), b"x").unwrap();
        fs::write(dir.path().join("good.jpg"), b"y").unwrap();
        let local = scan_local(dir.path(), "").unwrap();

        let plan = SyncPlan {
            upload: vec![
                ("bad.jpg".to_string(), UploadReason::New),
                ("good.jpg".to_string(), UploadReason::New),
            ],
            delete: vec!["remote-only.jpg".to_string()],
        };
        let report = execute(&plan, &local, &FailingStore).await;
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.failures.len(), 2);
    }
}
