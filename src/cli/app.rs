use super::prompt::ConsolePort;
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use docguard::{
    DecisionPort, DocumentStore, LoadOutcome, PartialDocument, PolicyPort, RelocationPolicy,
    SaveOutcome, StoreConfig,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "docguard")]
#[command(about = "Durable JSON document store for shared and local folders")]
pub struct Cli {
    /// Put every path (config, backup, documents) below this directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Directory holding the primary config record and the session file
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Default storage directory used when no config record resolves
    #[arg(long, global = true)]
    documents_dir: Option<PathBuf>,

    /// Treat paths below this directory as network mounts
    #[arg(long = "network-root", global = true)]
    network_roots: Vec<PathBuf>,

    /// Never prompt; apply the built-in recovery policy
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved document location
    Where,
    /// Load the document, running recovery if needed
    Load {
        /// Print the whole document instead of a summary
        #[arg(long)]
        print: bool,
    },
    /// Overwrite top-level fields with the ones in a partial JSON file
    Save { file: PathBuf },
    /// Merge a partial JSON file into the document
    Sync { file: PathBuf },
    /// Move the storage directory
    Relocate {
        dir: PathBuf,
        #[arg(long, value_enum, default_value_t = RelocateMode::Copy)]
        mode: RelocateMode,
    },
    /// Export the document into a compressed archive
    Export { dest: PathBuf },
    /// Replace the document with the one inside an archive
    Import { src: PathBuf },
    /// List emergency copies next to the document
    Rescues,
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    Show,
    Save { file: PathBuf },
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum RelocateMode {
    Copy,
    Fresh,
    Cancel,
}

impl From<RelocateMode> for RelocationPolicy {
    fn from(mode: RelocateMode) -> Self {
        match mode {
            RelocateMode::Copy => RelocationPolicy::CopyExisting,
            RelocateMode::Fresh => RelocationPolicy::StartFresh,
            RelocateMode::Cancel => RelocationPolicy::Cancel,
        }
    }
}

pub struct App {
    cli: Cli,
}

impl App {
    pub fn new() -> Self {
        Self { cli: Cli::parse() }
    }

    fn store_config(&self) -> StoreConfig {
        let mut config = match &self.cli.root {
            Some(root) => StoreConfig::rooted_at(root),
            None => StoreConfig::default(),
        };
        if let Some(dir) = &self.cli.config_dir {
            config = config.primary_config_path(dir.join("config.json"));
        }
        if let Some(dir) = &self.cli.documents_dir {
            config = config.default_documents_dir(dir);
        }
        for root in &self.cli.network_roots {
            config = config.network_root(root);
        }
        config
    }

    pub async fn run(&mut self) -> Result<()> {
        let port: Arc<dyn DecisionPort> = if self.cli.non_interactive {
            Arc::new(PolicyPort)
        } else {
            Arc::new(ConsolePort)
        };
        let store = DocumentStore::open(self.store_config(), port)
            .await
            .context("Failed to open document store")?;

        match &self.cli.command {
            Command::Where => {
                let location = store.location().await;
                println!("document: {}", location.document_path.display());
                println!("origin:   {:?}", location.origin);
                println!("default:  {}", location.is_default);
                println!("config:   {}", store.locator().primary_path().display());
                println!("backup:   {}", store.locator().backup_path().display());
                if let Some(artifact) = location.last_artifact_path() {
                    println!("last archive: {}", artifact.display());
                }
                Ok(())
            }
            Command::Load { print } => load(&store, *print).await,
            Command::Save { file } => {
                let partial = read_partial(file)?;
                report(store.save_document(partial).await?)
            }
            Command::Sync { file } => {
                let partial = read_partial(file)?;
                report(store.sync(partial).await?)
            }
            Command::Relocate { dir, mode } => {
                report(store.relocate_storage(dir, (*mode).into()).await?)
            }
            Command::Export { dest } => report(
                store
                    .export_archive(dest)
                    .await
                    .with_context(|| format!("Failed to export to '{}'", dest.display()))?,
            ),
            Command::Import { src } => report(
                store
                    .import_archive(src)
                    .await
                    .with_context(|| format!("Failed to import '{}'", src.display()))?,
            ),
            Command::Rescues => {
                let rescues = store.list_rescues().await?;
                if rescues.is_empty() {
                    println!("No emergency copies found.");
                }
                for rescue in rescues {
                    let created = rescue
                        .created_at()
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| rescue.created_at_ms.to_string());
                    println!("{}  {}", created, rescue.path.display());
                }
                Ok(())
            }
            Command::Session { action } => match action {
                SessionAction::Show => {
                    match store.load_session::<Value>().await {
                        Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
                        None => println!("No session stored."),
                    }
                    Ok(())
                }
                SessionAction::Save { file } => {
                    let session: Value = serde_json::from_str(&read_text(file)?)
                        .with_context(|| format!("'{}' is not valid JSON", file.display()))?;
                    report(store.save_session(&session).await?)
                }
                SessionAction::Clear => {
                    store.clear_session().await?;
                    println!("Session cleared.");
                    Ok(())
                }
            },
        }
    }
}

async fn load(store: &DocumentStore, print: bool) -> Result<()> {
    match store.load_document().await? {
        LoadOutcome::Loaded(loaded) => {
            if let Some(warning) = &loaded.warning {
                eprintln!("warning: {}", warning);
            }
            if print {
                println!("{}", loaded.document.to_json_pretty()?);
            } else {
                let doc = &loaded.document;
                println!("{} ({:?})", loaded.path.display(), loaded.source);
                println!(
                    "settings: {}, entries: {}, colors: {}, materials: {}, customers: {}",
                    doc.settings.len(),
                    doc.entries.len(),
                    doc.colors.len(),
                    doc.materials.len(),
                    doc.customers.len()
                );
            }
            Ok(())
        }
        LoadOutcome::QuitRequested { kind, path } => Err(anyhow!(
            "Load of '{}' abandoned ({:?})",
            path.display(),
            kind
        )),
    }
}

fn report(outcome: SaveOutcome) -> Result<()> {
    match outcome {
        SaveOutcome::Saved => println!("Saved."),
        SaveOutcome::SavedWithWarning { warning, .. } => eprintln!("warning: {}", warning),
        SaveOutcome::Canceled => println!("Canceled."),
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read '{}'", path.display()))
}

fn read_partial(path: &Path) -> Result<PartialDocument> {
    PartialDocument::parse(&read_text(path)?)
        .with_context(|| format!("'{}' is not a valid partial document", path.display()))
}
