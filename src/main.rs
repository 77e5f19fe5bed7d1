use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wikinorm::{
    config::Settings,
    display_text::TRIGGER_KEY,
    vault::{Document, DocumentStore, Position, Vault},
    workspace::{Workspace, NORMALIZE_CURRENT_COMMAND},
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Root directory of the vault
    #[arg(long, global = true, default_value = ".")]
    vault: PathBuf,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Normalize the wikilinks of one document and save it
    File { path: PathBuf },
    /// Normalize the wikilinks of every document in the vault
    All,
    /// Save a document, normalizing it first if normalize_on_save is set
    Save { path: PathBuf },
    /// Insert display text as if `|` was typed at LINE:COL (UTF-16 column)
    DisplayText { path: PathBuf, line: u32, col: u32 },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Persist one setting to the vault's settings file
    Set { key: String, value: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "wikinorm=debug"
    } else {
        "wikinorm=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let root_dir = cli
        .vault
        .canonicalize()
        .with_context(|| format!("opening vault {}", cli.vault.display()))?;
    let settings = Settings::new(&root_dir)?;

    match cli.command {
        Commands::Config { action: None } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Commands::Config {
            action: Some(ConfigAction::Set { key, value }),
        } => {
            let mut settings = settings;
            settings.set(&key, &value)?;
            settings.save(&root_dir)?;
            println!("{key} = {value}");
        }
        Commands::All => {
            let mut workspace = open_workspace(settings, &root_dir)?;
            workspace.normalize_vault().await;
            print_notices(&mut workspace);
        }
        Commands::File { path } => {
            let mut workspace = open_workspace(settings, &root_dir)?;
            open_document(&mut workspace, &path).await?;
            if workspace.run_command(NORMALIZE_CURRENT_COMMAND) {
                flush(&workspace).await?;
            }
            print_notices(&mut workspace);
        }
        Commands::Save { path } => {
            let mut workspace = open_workspace(settings, &root_dir)?;
            open_document(&mut workspace, &path).await?;
            workspace.save().await?;
            print_notices(&mut workspace);
        }
        Commands::DisplayText { path, line, col } => {
            let mut workspace = open_workspace(settings, &root_dir)?;
            open_document(&mut workspace, &path).await?;
            if let Some(active) = workspace.session_mut().active_mut() {
                active.buffer.set_cursor(Position::new(line, col));
            }
            if workspace.key_down(TRIGGER_KEY) {
                flush(&workspace).await?;
            } else {
                println!("No wikilink ends at {line}:{col}");
            }
        }
    }

    Ok(())
}

fn open_workspace(settings: Settings, root_dir: &Path) -> anyhow::Result<Workspace<Vault>> {
    let vault = Vault::construct_vault(root_dir)
        .with_context(|| format!("reading vault {}", root_dir.display()))?;
    Ok(Workspace::new(settings, vault))
}

async fn open_document(workspace: &mut Workspace<Vault>, path: &Path) -> anyhow::Result<()> {
    let document: Document = workspace
        .session()
        .store
        .select_document(path)
        .or_else(|| {
            let absolute = path.canonicalize().ok()?;
            workspace.session().store.select_document(&absolute)
        })
        .ok_or_else(|| anyhow!("{} is not a document of the vault", path.display()))?;
    workspace.open(document).await
}

/// Writes the open buffer back to its document.
async fn flush(workspace: &Workspace<Vault>) -> anyhow::Result<()> {
    let session = workspace.session();
    if let Some(active) = session.active() {
        session
            .store
            .write(&active.document, &active.buffer.text())
            .await?;
    }
    Ok(())
}

fn print_notices(workspace: &mut Workspace<Vault>) {
    for notice in workspace.session_mut().take_notices() {
        println!("{notice}");
    }
}
