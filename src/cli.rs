use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Asset pipeline for a photography site: ingest exports, read embedded
/// metadata, maintain collections and mirror the photo tree to a bucket.
#[derive(Debug, Parser)]
#[command(name = "photo-pipeline", version, about)]
pub struct Cli {
    /// Directory holding photos/, data/ and .r2config
    #[arg(long, global = true, default_value = ".")]
    pub project_root: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Move photos from photos/exports/ into photos/<year>/<location>/
    Ingest {
        /// Show what would be moved without touching any file
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect or regenerate embedded photo metadata
    #[command(subcommand)]
    Metadata(MetadataCommand),
    /// Create, fill and sync collections
    #[command(subcommand)]
    Collection(CollectionCommand),
    /// Manage the portfolio collection
    #[command(subcommand)]
    Portfolio(PortfolioCommand),
    /// Make the remote bucket mirror photos/ (or photos/<subdir>/)
    Mirror {
        /// Only mirror photos/<subdir>/ to <subdir>/ in the bucket
        subdir: Option<String>,
        /// Print the sync plan without uploading or deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Query the remote bucket
    #[command(subcommand)]
    Remote(RemoteCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum MetadataCommand {
    /// Print the metadata extracted from one photo
    Show {
        photo: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
        /// Also dump every EXIF field and the raw XMP packet
        #[arg(long)]
        raw: bool,
        /// Report whether the photo matches this collection's filters
        #[arg(long)]
        collection: Option<String>,
    },
    /// Regenerate data/photos/ with one YAML file per photo
    Generate {
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Collection name, used as the file name
    pub name: String,
    /// Display title (defaults to the title-cased name)
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, default_value = "")]
    pub description: String,
    /// Comma-separated keywords, e.g. "street, urban"
    #[arg(long)]
    pub keywords: Option<String>,
    /// Location, e.g. "Seattle"
    #[arg(long)]
    pub location: Option<String>,
    /// Rating, e.g. "5" or "4+"
    #[arg(long)]
    pub rating: Option<String>,
    /// Date prefix, e.g. "2025" or "2025:06"
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum CollectionCommand {
    /// Create a new collection; any filter option makes it a filtered one
    Create(CreateArgs),
    /// Add photos to a collection, creating it if needed
    Add {
        name: String,
        #[arg(required = true)]
        photos: Vec<PathBuf>,
    },
    /// Recompute filtered collections from the photo tree
    Sync {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,
        /// Sync every collection file
        #[arg(long)]
        all: bool,
    },
    /// Sync a collection with the files in photos/<name>/
    SyncDir { name: String },
    /// Ingest photos/exports/ and add every photo to the collection
    FromExports { name: String },
}

#[derive(Debug, Subcommand)]
pub enum PortfolioCommand {
    /// Add photos to the existing portfolio collection
    Add {
        #[arg(required = true)]
        photos: Vec<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum RemoteCommand {
    /// List every object in the bucket
    List {
        #[arg(default_value = "")]
        prefix: String,
    },
}
