//! FileCatalog CLI - Admin Command Line Interface
//!
//! This binary operates directly on a local catalog database.

use anyhow::Result;
use clap::{Parser, Subcommand};
use filecatalog_common::{CatalogConfig, FileUuid, Location, SnapshotUuid};
use filecatalog_engine::{Catalog, CreateOutcome};
use filecatalog_store::{Document, Filter, Keys, Page};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "filecatalog-cli")]
#[command(about = "FileCatalog Admin CLI")]
#[command(version)]
struct Args {
    /// Data directory holding the catalog database
    #[arg(short, long, default_value = "/var/lib/filecatalog")]
    data_dir: PathBuf,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// File record operations
    File {
        #[command(subcommand)]
        action: FileCommands,
    },
    /// Collection operations
    Collection {
        #[command(subcommand)]
        action: CollectionCommands,
    },
    /// Snapshot operations
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommands,
    },
}

#[derive(Subcommand, Debug)]
enum FileCommands {
    /// Register a file record (or a replica of an existing one)
    Ingest {
        /// Metadata document as JSON (`@path` reads a file, `-` reads stdin)
        metadata: String,
    },
    /// Show one file record
    Show {
        /// File uuid
        uuid: String,
        /// Fields to return (default: all)
        #[arg(short, long)]
        keys: Vec<String>,
    },
    /// List file records matching a query
    Find {
        /// Query as JSON (default: every record)
        #[arg(short, long)]
        query: Option<String>,
        /// Fields to return (default: uuid and logical_name)
        #[arg(short, long)]
        keys: Vec<String>,
        /// Maximum number of records
        #[arg(short, long)]
        limit: Option<usize>,
        /// Number of records to skip
        #[arg(long, default_value_t = 0)]
        start: usize,
    },
    /// Count file records matching a query
    Count {
        /// Query as JSON (default: every record)
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Merge new metadata into a file record
    Update {
        /// File uuid
        uuid: String,
        /// Partial metadata document as JSON (`@path` or `-` accepted)
        metadata: String,
    },
    /// Replace a file record wholesale
    Replace {
        /// File uuid
        uuid: String,
        /// Full metadata document as JSON (`@path` or `-` accepted)
        metadata: String,
    },
    /// Delete a file record
    Delete {
        /// File uuid
        uuid: String,
    },
    /// Register an additional replica location
    AddLocation {
        /// File uuid
        uuid: String,
        /// Site name
        site: String,
        /// Path at the site
        path: String,
        /// Mark the copy as archival
        #[arg(long)]
        archive: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CollectionCommands {
    /// Create a collection from a query
    Create {
        /// Collection name
        name: String,
        /// Owning user or group
        #[arg(short, long)]
        owner: String,
        /// Membership query as JSON
        #[arg(short, long)]
        query: String,
    },
    /// Show one collection
    Show {
        /// Collection uuid or name
        collection: String,
    },
    /// List collections
    List {
        /// Maximum number of records
        #[arg(short, long)]
        limit: Option<usize>,
        /// Number of records to skip
        #[arg(long, default_value_t = 0)]
        start: usize,
    },
    /// List the files currently matching a collection's query
    Files {
        /// Collection uuid or name
        collection: String,
        /// Fields to return (default: uuid and logical_name)
        #[arg(short, long)]
        keys: Vec<String>,
        /// Maximum number of records
        #[arg(short, long)]
        limit: Option<usize>,
        /// Number of records to skip
        #[arg(long, default_value_t = 0)]
        start: usize,
    },
    /// List the snapshots taken of a collection
    Snapshots {
        /// Collection uuid or name
        collection: String,
    },
}

#[derive(Subcommand, Debug)]
enum SnapshotCommands {
    /// Freeze a collection's current membership
    Create {
        /// Collection uuid or name
        collection: String,
        /// Owner override (default: the collection's owner)
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show one snapshot
    Show {
        /// Snapshot uuid
        uuid: String,
    },
    /// List snapshots
    List {
        /// Maximum number of records
        #[arg(short, long)]
        limit: Option<usize>,
        /// Number of records to skip
        #[arg(long, default_value_t = 0)]
        start: usize,
    },
    /// List the file records frozen in a snapshot
    Files {
        /// Snapshot uuid
        uuid: String,
        /// Fields to return (default: uuid and logical_name)
        #[arg(short, long)]
        keys: Vec<String>,
        /// Maximum number of records
        #[arg(short, long)]
        limit: Option<usize>,
        /// Number of records to skip
        #[arg(long, default_value_t = 0)]
        start: usize,
    },
}

fn parse_query(text: Option<&str>) -> Result<Filter> {
    match text {
        None => Ok(Filter::Empty),
        Some(text) => {
            Filter::from_json(text).map_err(|e| anyhow::anyhow!("Invalid query: {e}"))
        }
    }
}

/// Resolve a payload argument: `-` reads stdin, `@path` reads a file,
/// anything else is taken as inline JSON.
fn read_payload(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut text = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut text)?;
        return Ok(text);
    }
    if let Some(path) = arg.strip_prefix('@') {
        return std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read '{path}': {e}"));
    }
    Ok(arg.to_string())
}

fn parse_metadata(arg: &str) -> Result<Document> {
    let text = read_payload(arg)?;
    let value =
        serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("Invalid metadata: {e}"))?;
    Document::from_value(value).ok_or_else(|| anyhow::anyhow!("Metadata must be a JSON object"))
}

fn parse_file_uuid(text: &str) -> Result<FileUuid> {
    FileUuid::parse(text).map_err(|e| anyhow::anyhow!("Invalid file uuid '{text}': {e}"))
}

fn requested_keys(keys: Vec<String>) -> Option<Keys> {
    if keys.is_empty() {
        None
    } else {
        Some(Keys::Fields(keys))
    }
}

const fn page(limit: Option<usize>, start: usize) -> Page {
    Page { limit, start }
}

fn print_documents(docs: &[Document]) -> Result<()> {
    if docs.is_empty() {
        println!("No records found");
        return Ok(());
    }
    for doc in docs {
        println!("{}", serde_json::to_string(doc)?);
    }
    Ok(())
}

fn print_pretty(doc: &Document) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(doc)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = CatalogConfig::default();
    config.store.data_dir.clone_from(&args.data_dir);
    let catalog = Catalog::open(&config)?;

    match args.command {
        Commands::File { action } => match action {
            FileCommands::Ingest { metadata } => {
                let doc = parse_metadata(&metadata)?;
                match catalog.files.create(doc).await? {
                    CreateOutcome::Created(uuid) => println!("Created file record {uuid}"),
                    CreateOutcome::ReplicaAdded(uuid) => {
                        println!("Added replica to file record {uuid}");
                    }
                }
            }
            FileCommands::Show { uuid, keys } => {
                let uuid = parse_file_uuid(&uuid)?;
                let doc = catalog.files.get_document(uuid, requested_keys(keys)).await?;
                print_pretty(&doc)?;
            }
            FileCommands::Find {
                query,
                keys,
                limit,
                start,
            } => {
                let filter = parse_query(query.as_deref())?;
                let docs = catalog
                    .files
                    .find(&filter, requested_keys(keys), page(limit, start))
                    .await?;
                print_documents(&docs)?;
            }
            FileCommands::Count { query } => {
                let filter = parse_query(query.as_deref())?;
                let count = catalog.files.count(&filter).await?;
                println!("{count}");
            }
            FileCommands::Update { uuid, metadata } => {
                let uuid = parse_file_uuid(&uuid)?;
                let partial = parse_metadata(&metadata)?;
                let record = catalog.files.update(uuid, partial).await?;
                println!("Updated file record {uuid}");
                print_pretty(&record.to_document()?)?;
            }
            FileCommands::Replace { uuid, metadata } => {
                let uuid = parse_file_uuid(&uuid)?;
                let mut doc = parse_metadata(&metadata)?;
                doc.set("uuid", uuid.to_string());
                let record = catalog.files.replace(doc).await?;
                println!("Replaced file record {uuid}");
                print_pretty(&record.to_document()?)?;
            }
            FileCommands::Delete { uuid } => {
                let uuid = parse_file_uuid(&uuid)?;
                catalog.files.delete(uuid).await?;
                println!("Deleted file record {uuid}");
            }
            FileCommands::AddLocation {
                uuid,
                site,
                path,
                archive,
            } => {
                let uuid = parse_file_uuid(&uuid)?;
                let mut location = Location::new(site, path)?;
                if archive {
                    location = location.with_archive(true);
                }
                let record = catalog.files.add_locations(uuid, &[location]).await?;
                println!(
                    "File record {uuid} now has {} location(s)",
                    record.locations.len()
                );
            }
        },
        Commands::Collection { action } => match action {
            CollectionCommands::Create { name, owner, query } => {
                let filter = parse_query(Some(&query))?;
                let uuid = catalog
                    .collections
                    .create(None, &name, &owner, &filter)
                    .await?;
                println!("Created collection {uuid}");
            }
            CollectionCommands::Show { collection } => {
                let record = catalog.collections.get(&collection).await?;
                print_pretty(&record.to_document()?)?;
            }
            CollectionCommands::List { limit, start } => {
                let docs = catalog
                    .collections
                    .find(&Filter::Empty, None, page(limit, start))
                    .await?;
                print_documents(&docs)?;
            }
            CollectionCommands::Files {
                collection,
                keys,
                limit,
                start,
            } => {
                let docs = catalog
                    .collections
                    .files_of(
                        &collection,
                        &catalog.files,
                        requested_keys(keys),
                        page(limit, start),
                    )
                    .await?;
                print_documents(&docs)?;
            }
            CollectionCommands::Snapshots { collection } => {
                let docs = catalog
                    .collections
                    .snapshots_of(&collection, None, Page::default())
                    .await?;
                print_documents(&docs)?;
            }
        },
        Commands::Snapshot { action } => match action {
            SnapshotCommands::Create { collection, owner } => {
                let uuid = catalog
                    .snapshots
                    .create(&collection, None, owner.as_deref())
                    .await?;
                println!("Created snapshot {uuid}");
            }
            SnapshotCommands::Show { uuid } => {
                let uuid = SnapshotUuid::parse(&uuid)
                    .map_err(|e| anyhow::anyhow!("Invalid snapshot uuid '{uuid}': {e}"))?;
                let record = catalog.snapshots.get(uuid).await?;
                print_pretty(&record.to_document()?)?;
            }
            SnapshotCommands::List { limit, start } => {
                let docs = catalog
                    .snapshots
                    .find(&Filter::Empty, None, page(limit, start))
                    .await?;
                print_documents(&docs)?;
            }
            SnapshotCommands::Files {
                uuid,
                keys,
                limit,
                start,
            } => {
                let uuid = SnapshotUuid::parse(&uuid)
                    .map_err(|e| anyhow::anyhow!("Invalid snapshot uuid '{uuid}': {e}"))?;
                let docs = catalog
                    .snapshots
                    .files_of(uuid, requested_keys(keys), page(limit, start))
                    .await?;
                print_documents(&docs)?;
            }
        },
    }

    Ok(())
}
