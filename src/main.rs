use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use notegraph::commands::App;
use notegraph::config::{self, Settings};
use notegraph::vault::VaultOptions;
use tracing::info;

#[derive(Parser)]
#[command(name = "notegraph")]
#[command(about = "Markdown vault indexer with structured query and hybrid search")]
struct Cli {
    /// Optional settings file; environment variables override it.
    #[arg(short, long)]
    config: Option<String>,

    /// Vault root directory.
    #[arg(short, long, default_value = ".")]
    vault: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the vault once and print index stats.
    Index,
    /// Scan, then keep the index live until interrupted, printing events.
    Watch,
    /// Full-text search over indexed notes.
    Search {
        query: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Run a YAML query embed from a file, or stdin with "-".
    Query { file: String },
    /// Print vault info as JSON.
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    config::init_logging(&settings.logging)?;

    info!("notegraph v{}", env!("CARGO_PKG_VERSION"));

    let options = |watch: bool| VaultOptions {
        debounce: Duration::from_millis(settings.indexing.debounce_ms),
        watch,
        semantic_search: settings.search.semantic_enabled,
    };

    let mut app = App::new();

    match cli.command {
        Command::Index => {
            let vault_info = app.open_vault(&cli.vault, options(false))?;
            println!("indexed {} notes in {}", vault_info.note_count, vault_info.root.display());
        }
        Command::Watch => {
            app.open_vault(&cli.vault, options(true))?;
            let mut events = app.subscribe()?;
            info!("watching {} (ctrl-c to stop)", cli.vault.display());
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(event) => println!("{}", serde_json::to_string(&event)?),
                        Err(_) => continue,
                    },
                }
            }
            app.close_vault();
        }
        Command::Search { query, limit } => {
            app.open_vault(&cli.vault, options(false))?;
            let results = app.search_notes(&query, Some(limit))?;
            for result in results {
                println!(
                    "{:>8.5}  {:<8}  {}",
                    result.score,
                    format!("{:?}", result.match_type).to_lowercase(),
                    result.note.path
                );
            }
        }
        Command::Query { file } => {
            let yaml = if file == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                std::fs::read_to_string(&file)?
            };
            app.open_vault(&cli.vault, options(false))?;
            let response = app.execute_query_embed(&yaml)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Info => {
            app.open_vault(&cli.vault, options(false))?;
            println!("{}", serde_json::to_string_pretty(&app.get_vault_info()?)?);
        }
    }

    Ok(())
}
