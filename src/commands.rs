//! One handler per subcommand. Handlers print their per-item report to
//! stdout and return how many items failed; diagnostics go through `log`.

use crate::cli::{CollectionCommand, Command, CreateArgs, MetadataCommand, OutputFormat, PortfolioCommand, RemoteCommand};
use crate::collection::{self, Collection, FilterSync};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::exif_fields;
use crate::filter::{self, FilterSpec};
use crate::ingest::{self, ExportAction};
use crate::metadata;
use crate::mirror::{self, UploadReason};
use crate::processor;
use crate::store::ObjectStore;
use crate::store_clients::{directory::DirectoryStore, r2::R2Store};
use crate::walker::{self, IMAGE_EXTENSIONS};
use crate::xmp;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PORTFOLIO: &str = "portfolio";

const RULE: &str = "============================================================";
const WIDE_RULE: &str =
    "--------------------------------------------------------------------------------";
const MB: f64 = 1024.0 * 1024.0;

/// Result of a command that ran to completion. Any failed item makes the
/// process exit non-zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub failures: usize,
}

impl Outcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(failures: usize) -> Self {
        Self { failures }
    }

    pub fn is_success(&self) -> bool {
        self.failures == 0
    }
}

pub async fn run(command: Command, config: &AppConfig) -> Result<Outcome, AppError> {
    match command {
        Command::Ingest { dry_run } => ingest_exports(config, dry_run),
        Command::Metadata(MetadataCommand::Show {
            photo,
            format,
            raw,
            collection,
        }) => show_metadata(config, &photo, format, raw, collection.as_deref()),
        Command::Metadata(MetadataCommand::Generate { dry_run }) => generate_metadata(config, dry_run),
        Command::Collection(CollectionCommand::Create(args)) => create_collection(config, args),
        Command::Collection(CollectionCommand::Add { name, photos }) => add_photos(config, &name, &photos, false),
        Command::Collection(CollectionCommand::Sync { name, all }) => match name {
            Some(name) if !all => sync_collection(config, &name),
            _ => sync_all_collections(config),
        },
        Command::Collection(CollectionCommand::SyncDir { name }) => sync_directory(config, &name),
        Command::Collection(CollectionCommand::FromExports { name }) => collection_from_exports(config, &name),
        Command::Portfolio(PortfolioCommand::Add { photos }) => add_photos(config, PORTFOLIO, &photos, true),
        Command::Mirror { subdir, dry_run } => {
            let store = open_store(config)?;
            mirror(config, store.as_ref(), subdir.as_deref().unwrap_or(""), dry_run).await
        }
        Command::Remote(RemoteCommand::List { prefix }) => {
            let store = open_store(config)?;
            list_remote(store.as_ref(), &prefix).await
        }
    }
}

pub fn open_store(config: &AppConfig) -> Result<Arc<dyn ObjectStore>, AppError> {
    let store: Arc<dyn ObjectStore> = if config.remote.backend == "directory" {
        Arc::new(DirectoryStore::new(config)?)
    } else {
        Arc::new(R2Store::new(config)?)
    };
    log::info!("Remote store: {}", store.describe());
    Ok(store)
}

fn ingest_exports(config: &AppConfig, dry_run: bool) -> Result<Outcome, AppError> {
    let report = ingest::ingest_exports(&config.photos_dir, dry_run)?;
    let exports = config.exports_dir();

    if !report.exports_existed {
        println!("Exports directory not found: {}", exports.display());
        println!("Created: {}", exports.display());
        println!("\nPlace photos in this directory and run the command again.");
        return Ok(Outcome::ok());
    }
    if report.items.is_empty() {
        println!("No photos found in {}", exports.display());
        return Ok(Outcome::ok());
    }

    println!("\n{}", RULE);
    println!("{}", if dry_run { "DRY RUN - No files will be moved" } else { "INGESTING PHOTOS" });
    println!("{}", RULE);
    println!("Found {} photo(s) in exports/\n", report.items.len());

    for item in &report.items {
        match &item.result {
            Ok(destination) => {
                println!("✓ {}", item.file_name);
                let verb = if dry_run { "Would move to" } else { "Moved to" };
                let note = if destination.replaces { " (replaces existing file)" } else { "" };
                println!("  {} {}{}", verb, destination.relative, note);
            }
            Err(e) => {
                println!("✗ {}", item.file_name);
                println!("  {}", e);
            }
        }
    }

    println!("\n{}", RULE);
    println!("Summary: {} succeeded, {} failed", report.succeeded(), report.failed());
    if report.replaced() > 0 {
        println!("  ({} photo(s) replaced existing files)", report.replaced());
    }
    if dry_run {
        println!("\nThis was a dry run. Run without --dry-run to move files.");
    }
    println!("{}\n", RULE);
    Ok(Outcome::failed(report.failed()))
}

fn show_metadata(
    config: &AppConfig,
    photo: &Path,
    format: OutputFormat,
    raw: bool,
    collection: Option<&str>,
) -> Result<Outcome, AppError> {
    let bytes = match std::fs::read(photo) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(photo.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let extracted = metadata::extract_bytes(&bytes);
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&extracted)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&extracted)?),
    }

    if let Some(name) = collection {
        let target = Collection::load(&config.collection_file(name))?;
        match target.filters.as_ref().filter(|spec| !spec.is_empty()) {
            Some(spec) => {
                let verdict = if filter::matches(&extracted, spec)? { "yes" } else { "no" };
                println!("\nMatches filters of '{}': {}", name, verdict);
            }
            None => println!("\n'{}' is a manual collection with no filters", name),
        }
    }

    if raw {
        if let Some(path) = extracted.location.as_ref().and_then(|l| l.to_path_string()) {
            println!("\nLocation path: {}", path);
        }

        println!("\nEXIF fields:");
        let fields = exif_fields::raw_fields(&bytes);
        if fields.is_empty() {
            println!("  No EXIF data found");
        }
        for (tag, value) in fields {
            println!("  {}: {}", tag, value);
        }

        println!("\nXMP packet:");
        match xmp::find_packet(&bytes) {
            Some(packet) => println!("{}", String::from_utf8_lossy(packet)),
            None => println!("  No XMP data found"),
        }
    }
    Ok(Outcome::ok())
}

fn generate_metadata(config: &AppConfig, dry_run: bool) -> Result<Outcome, AppError> {
    if !config.photos_dir.is_dir() {
        return Err(AppError::NotFound(format!("photos directory {}", config.photos_dir.display())));
    }
    if dry_run {
        println!("DRY RUN - No files will be created\n");
    }

    let report = processor::generate_metadata_files(&config.photos_dir, &config.metadata_dir, dry_run)?;
    let shown = |path: &Path| {
        path.strip_prefix(&config.metadata_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    };
    if report.cleared_existing {
        println!("Deleted existing metadata files in {}", config.metadata_dir.display());
    }
    for path in &report.created {
        let verb = if dry_run { "Create" } else { "Created" };
        println!("{}: {}", verb, shown(path).display());
    }
    for (photo, e) in &report.errors {
        println!("Error: {}: {}", photo.display(), e);
    }

    println!("\n{}", RULE);
    println!("Summary:");
    println!("  Created: {}", report.created.len());
    println!("  Errors:  {}", report.errors.len());
    println!("{}", RULE);
    if dry_run {
        println!("\nThis was a dry run. Run without --dry-run to actually create files.");
    }
    Ok(Outcome::failed(report.errors.len()))
}

fn create_collection(config: &AppConfig, args: CreateArgs) -> Result<Outcome, AppError> {
    let path = config.collection_file(&args.name);
    if path.exists() {
        return Err(AppError::AlreadyExists(format!(
            "collection {} (edit the file and run `collection sync {}` to change its filters)",
            path.display(),
            args.name
        )));
    }

    let spec = FilterSpec {
        keywords: args.keywords,
        location: args.location,
        rating: args.rating,
        date: args.date,
        ..Default::default()
    };
    let filters = if spec.is_empty() {
        None
    } else {
        spec.compile()?;
        Some(spec)
    };

    let mut collection = Collection::new(&args.name, &args.description, filters);
    if let Some(title) = args.title {
        collection.title = title;
    }
    collection.save(&path)?;

    println!("\n=== Collection Created ===");
    println!("\nCollection: {}", args.name);
    println!("Title: {}", collection.title);
    if !collection.description.is_empty() {
        println!("Description: {}", collection.description);
    }
    match &collection.filters {
        Some(spec) => {
            println!("\nFilters:");
            for (key, value) in [
                ("keywords", &spec.keywords),
                ("location", &spec.location),
                ("rating", &spec.rating),
                ("date", &spec.date),
            ] {
                if let Some(value) = value {
                    println!("  {}: {}", key, value);
                }
            }
            println!(
                "\nThis is a filtered collection. Run `collection sync {}` to populate it with matching photos.",
                args.name
            );
        }
        None => println!(
            "\nThis is a manual collection. Use `collection add {} <photo-paths>` to add photos.",
            args.name
        ),
    }
    println!("\nCollection file: {}", path.display());
    Ok(Outcome::ok())
}

/// Adds photos by filesystem path. The portfolio must already exist; any
/// other collection is created on first use.
fn add_photos(config: &AppConfig, name: &str, photos: &[PathBuf], must_exist: bool) -> Result<Outcome, AppError> {
    let path = config.collection_file(name);
    let mut collection = if must_exist {
        Collection::load(&path)?
    } else {
        Collection::load_or_create(&path, name)?
    };

    let mut added = Vec::new();
    let mut skipped = Vec::new();
    let mut errors = Vec::new();
    for photo in photos {
        match collection::photo_key(photo, &config.photos_dir) {
            Ok(key) if collection.add_photo(&key) => added.push(key),
            Ok(key) => skipped.push(key),
            Err(e) => errors.push(e),
        }
    }
    if !added.is_empty() {
        collection.save(&path)?;
    }

    let label = if must_exist { "Portfolio".to_string() } else { format!("Collection '{}'", name) };
    let target = if must_exist { "portfolio" } else { "collection" };
    println!("\n=== {} Update Summary ===", label);
    if !added.is_empty() {
        println!("\nAdded {} photo(s):", added.len());
        for key in &added {
            println!("  + {}", key);
        }
    }
    if !skipped.is_empty() {
        println!("\nSkipped {} photo(s) (already in {}):", skipped.len(), target);
        for key in &skipped {
            println!("  - {}", key);
        }
    }
    if !errors.is_empty() {
        println!("\nErrors ({}):", errors.len());
        for e in &errors {
            println!("  ! {}", e);
        }
    }
    println!("\nTotal photos in {}: {}", target, collection.photos.len());
    println!("Collection file: {}", path.display());
    Ok(Outcome::failed(errors.len()))
}

/// Returns whether the collection had filters and was rewritten.
fn sync_one(config: &AppConfig, path: &Path, name: &str) -> Result<bool, AppError> {
    let mut collection = Collection::load(path)?;
    if !collection.is_filtered() {
        println!("Skipping '{}' (manual collection, no filters)", name);
        return Ok(false);
    }

    println!("Scanning photos for collection '{}'...", name);
    match collection.sync_with_filters(&config.photos_dir)? {
        FilterSync::Skipped => Ok(false),
        FilterSync::Synced { before, after } => {
            collection.save(path)?;
            println!("  Before: {} photos", before);
            println!("  After: {} photos", after);
            println!("  Change: {:+}", after as i64 - before as i64);
            Ok(true)
        }
    }
}

fn sync_collection(config: &AppConfig, name: &str) -> Result<Outcome, AppError> {
    println!("\n=== Syncing Collection '{}' ===\n", name);
    sync_one(config, &config.collection_file(name), name)?;
    Ok(Outcome::ok())
}

fn sync_all_collections(config: &AppConfig) -> Result<Outcome, AppError> {
    println!("\n=== Syncing All Filtered Collections ===\n");
    let mut files: Vec<PathBuf> = std::fs::read_dir(&config.collections_dir)
        .map_err(|_| AppError::NotFound(format!("collections directory {}", config.collections_dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && walker::has_extension(path, &["yaml"]))
        .collect();
    files.sort();

    let (mut synced, mut skipped, mut failed) = (0, 0, 0);
    for path in &files {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match sync_one(config, path, &name) {
            Ok(true) => synced += 1,
            Ok(false) => skipped += 1,
            Err(e) => {
                log::error!("Failed to sync collection '{}': {}", name, e);
                println!("  ✗ {}", e);
                failed += 1;
            }
        }
        println!();
    }

    println!("=== Summary ===");
    println!("Synced: {} collections", synced);
    println!("Skipped: {} collections (manual)", skipped);
    if failed > 0 {
        println!("Failed: {} collections", failed);
    }
    Ok(Outcome::failed(failed))
}

fn sync_directory(config: &AppConfig, name: &str) -> Result<Outcome, AppError> {
    let dir = config.photos_dir.join(name);
    let path = config.collection_file(name);

    let files: Vec<String> = if dir.is_dir() {
        walker::list_images(&dir, IMAGE_EXTENSIONS)?
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect()
    } else {
        Vec::new()
    };
    let existing = Collection::load_existing(&path)?;
    if files.is_empty() && existing.is_none() {
        return Err(AppError::NotFound(format!(
            "no image files in {} and no existing collection to update",
            dir.display()
        )));
    }

    let is_new = existing.is_none();
    let mut collection = existing.unwrap_or_else(|| Collection::new(name, "", None));
    if is_new {
        if let Some(first) = files.first() {
            collection.cover_path = format!("{}/{}", name, first);
        }
    }
    let sync = collection.sync_with_directory(name, &files);
    collection.save(&path)?;

    let total = collection.photos.len();
    if sync.added > 0 || sync.removed > 0 || sync.cover_updated {
        if sync.added > 0 {
            println!("Added {} new photo(s)", sync.added);
        }
        if sync.removed > 0 {
            println!("Removed {} photo(s) that no longer exist", sync.removed);
        }
        if sync.cover_updated {
            if collection.cover_path.is_empty() {
                println!("Cleared cover_path (no photos remaining)");
            } else {
                println!("Updated cover_path to: {}", collection.cover_path);
            }
        }
        println!("Total photos in collection: {}", total);
    } else {
        println!("No changes needed. Collection is in sync with {} photos.", total);
    }
    println!("Collection file: {}", path.display());
    Ok(Outcome::ok())
}

fn collection_from_exports(config: &AppConfig, name: &str) -> Result<Outcome, AppError> {
    let path = config.collection_file(name);
    let mut collection = Collection::load_or_create(&path, name)?;
    let report = ingest::ingest_into_collection(&config.photos_dir, &mut collection)?;

    if report.items.is_empty() {
        println!("No photos found in {}", config.exports_dir().display());
        return Ok(Outcome::ok());
    }

    println!("\n{}", RULE);
    println!("Adding photos to collection '{}'", name);
    println!("{}", RULE);
    println!("Found {} photo(s) in exports/\n", report.items.len());

    let (mut existed, mut ingested, mut already_member) = (0, 0, 0);
    for item in &report.items {
        println!("Processing {}...", item.file_name);
        match &item.result {
            Ok(ExportAction::AlreadyIngested { relative, added }) => {
                existed += 1;
                if *added {
                    println!("  ✓ Already ingested at {}", relative);
                    println!("    Added to collection");
                } else {
                    already_member += 1;
                    println!("  → Already in collection at {}", relative);
                }
                println!("    Deleted from exports/");
            }
            Ok(ExportAction::Ingested { relative, added }) => {
                ingested += 1;
                println!("  ✓ Moved to {}", relative);
                if *added {
                    println!("    Added to collection");
                } else {
                    already_member += 1;
                    println!("    Already in collection");
                }
            }
            Err(e) => println!("  ✗ {}", e),
        }
    }

    let added = report.added();
    if added > 0 {
        collection.save(&path)?;
    }

    println!("\n{}", RULE);
    println!("Summary:");
    println!("  Already existed: {} (deleted from exports)", existed);
    println!("  Newly ingested: {}", ingested);
    println!("  Added to collection: {}", added);
    println!("  Already in collection: {}", already_member);
    if report.errors() > 0 {
        println!("  Errors: {}", report.errors());
    }
    if added > 0 {
        println!("\nCollection updated: {}", path.display());
        println!("Total photos in collection: {}", collection.photos.len());
    } else {
        println!("\nNo new photos added (all already in collection)");
    }
    println!("{}\n", RULE);
    Ok(Outcome::failed(report.errors()))
}

fn print_sample<'a>(keys: impl ExactSizeIterator<Item = &'a String>) {
    let total = keys.len();
    for key in keys.take(5) {
        println!("  - {}", key);
    }
    if total > 5 {
        println!("  ... and {} more", total - 5);
    }
}

pub async fn mirror(config: &AppConfig, store: &dyn ObjectStore, subdir: &str, dry_run: bool) -> Result<Outcome, AppError> {
    let prefix = mirror::normalize_prefix(subdir);
    let local_dir = if prefix.is_empty() {
        config.photos_dir.clone()
    } else {
        config.photos_dir.join(prefix.trim_end_matches('/'))
    };

    if prefix.is_empty() {
        println!("Syncing contents of {}/ to {} root", local_dir.display(), store.describe());
    } else {
        println!(
            "Syncing {} to {} with prefix '{}'",
            local_dir.display(),
            store.describe(),
            prefix
        );
    }
    println!("{}", WIDE_RULE);

    println!("Scanning local files...");
    let local = mirror::scan_local(&local_dir, &prefix)?;
    println!("Found {} local files", local.len());
    if !local.is_empty() {
        println!("Local file keys:");
        print_sample(local.keys());
    }

    println!("\nListing remote objects...");
    let remote = mirror::list_remote(store, &prefix).await?;
    println!("Found {} remote objects with prefix '{}'", remote.len(), prefix);
    if !remote.is_empty() {
        println!("Remote object keys:");
        print_sample(remote.keys());
    }
    println!();

    let plan = mirror::diff(&mirror::local_stats(&local), &remote);
    println!("Sync Plan:");
    println!("  Upload: {} files", plan.upload.len());
    println!("  Delete: {} files", plan.delete.len());
    println!("  No change: {} files", local.len() - plan.upload.len());
    println!();

    if plan.is_empty() {
        println!("✓ Everything is already in sync!");
        return Ok(Outcome::ok());
    }

    for (key, reason) in &plan.upload {
        let size = local.get(key).map(|f| f.stat.size).unwrap_or(0) as f64 / MB;
        let arrow = if *reason == UploadReason::New { "↑" } else { "↻" };
        println!("  {} {} ({:.2} MB) [{}]", arrow, key, size, reason);
    }
    for key in &plan.delete {
        println!("  ✗ {}", key);
    }

    if dry_run {
        println!("\nThis was a dry run. Run without --dry-run to apply the plan.");
        return Ok(Outcome::ok());
    }

    let report = mirror::execute(&plan, &local, store).await;
    println!();
    if !plan.upload.is_empty() {
        println!("✓ Uploaded {}/{} files", report.uploaded, plan.upload.len());
    }
    if !plan.delete.is_empty() {
        println!("✓ Deleted {}/{} files", report.deleted, plan.delete.len());
    }
    for (key, e) in &report.failures {
        eprintln!("Error syncing {}: {}", key, e);
    }
    println!("{}", WIDE_RULE);
    if report.failures.is_empty() {
        println!("✓ Sync complete!");
    } else {
        println!("Sync finished with {} failure(s)", report.failures.len());
    }
    Ok(Outcome::failed(report.failures.len()))
}

pub async fn list_remote(store: &dyn ObjectStore, prefix: &str) -> Result<Outcome, AppError> {
    println!("Listing objects in {}", store.describe());
    println!("{}", WIDE_RULE);

    let objects = mirror::list_remote(store, prefix).await?;
    if objects.is_empty() {
        println!("No objects found in bucket");
        return Ok(Outcome::ok());
    }

    println!("Found {} objects:\n", objects.len());
    for (key, stat) in &objects {
        println!("{}", key);
        println!("  Size: {:.2} MB", stat.size as f64 / MB);
        println!("  Modified: {}", stat.modified);
        println!();
    }

    let total: u64 = objects.values().map(|s| s.size).sum();
    println!("{}", WIDE_RULE);
    println!(
        "Total: {} objects, {:.2} GB ({:.2} MB)",
        objects.len(),
        total as f64 / (MB * 1024.0),
        total as f64 / MB
    );
    Ok(Outcome::ok())
}
