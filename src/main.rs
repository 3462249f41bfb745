mod config;
mod file_io;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use umlsync_core::{Diagram, DiagramId, DurableId, MemoryCanvas};
use umlsync_sync::{HttpStore, ModelStore, SyncEngine};

use config::Config;

type Engine = SyncEngine<HttpStore, MemoryCanvas>;

/// Collaborative UML class diagrams from the command line
#[derive(Parser, Debug)]
#[command(name = "umlsync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Model Store base URL (overrides config and UMLSYNC_SERVER)
    #[arg(long, global = true, value_name = "URL")]
    server: Option<String>,

    /// Diagram to work on
    #[arg(long, global = true, value_name = "ID")]
    diagram: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the diagrams on the server
    List,
    /// Create an empty diagram and print its id
    New {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Write the diagram as an XMI document
    Export {
        /// Output file or directory
        #[arg(value_name = "FILE")]
        output: Option<PathBuf>,
        /// Ask the server's code generator for a zip of classes instead
        #[arg(long)]
        generate: bool,
    },
    /// Add the contents of an XMI document to the diagram
    Import {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Print the diagram's classes and relationships
    Inspect {
        /// Print the raw records as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?.with_server_override(args.server.clone());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    rt.block_on(run(args, config))
}

async fn run(args: Args, config: Config) -> Result<()> {
    let store = HttpStore::new(config.server_url.clone(), config.timeout())
        .with_context(|| format!("Failed to set up client for {}", config.server_url))?;
    let command = match args.command {
        Command::List => return list(&store).await,
        Command::New { name } => return create(&store, &name).await,
        command => command,
    };

    let diagram = args.diagram.ok_or_else(|| anyhow!("--diagram is required for this command"))?;
    let mut engine = SyncEngine::new(DiagramId::new(diagram), store, MemoryCanvas::new());
    engine
        .load()
        .await
        .with_context(|| format!("Failed to load diagram {}", engine.diagram_id()))?;

    match command {
        Command::Export { output, generate: false } => export(&engine, output, &config),
        Command::Export { output, generate: true } => generate(&engine, output, &config).await,
        Command::Import { input } => import(&mut engine, input).await,
        Command::Inspect { json } => inspect(&engine, json),
        Command::List | Command::New { .. } => Ok(()),
    }
}

async fn list(store: &HttpStore) -> Result<()> {
    let diagrams = store.list_diagrams().await.context("Failed to list diagrams")?;
    if diagrams.is_empty() {
        println!("no diagrams");
    }
    for diagram in diagrams {
        println!("{}  {}", diagram.id, diagram.name);
    }
    Ok(())
}

async fn create(store: &HttpStore, name: &str) -> Result<()> {
    let created = store
        .create_diagram(name)
        .await
        .with_context(|| format!("Failed to create diagram {name:?}"))?;
    info!(id = %created.id, "created diagram");
    println!("{}", created.id);
    Ok(())
}

fn export(engine: &Engine, output: Option<PathBuf>, config: &Config) -> Result<()> {
    let xml = engine.export_document().context("Failed to encode diagram")?;
    let path = file_io::export_path(output.as_deref(), &config.default_export_name);
    file_io::save_document(&xml, &path)?;
    info!(path = %path.display(), "exported");
    Ok(())
}

async fn generate(engine: &Engine, output: Option<PathBuf>, config: &Config) -> Result<()> {
    let archive = engine
        .store()
        .generate_code(&engine.snapshot())
        .await
        .context("Code generation failed")?;
    let path = file_io::export_path(output.as_deref(), &config.default_generated_name);
    file_io::save_document(&archive, &path)?;
    info!(path = %path.display(), bytes = archive.len(), "generated code");
    Ok(())
}

async fn import(engine: &mut Engine, input: PathBuf) -> Result<()> {
    let xml = file_io::load_document(&input)?;
    let report = engine
        .import_document(&xml)
        .await
        .with_context(|| format!("Failed to import {:?}", input))?;

    for error in &report.errors {
        warn!(%error, "skipped");
    }
    println!(
        "imported {} classes, {} links, {} association classes ({} skipped)",
        report.classes_created,
        report.links_created,
        report.constructs_created,
        report.errors.len()
    );
    Ok(())
}

fn inspect(engine: &Engine, json: bool) -> Result<()> {
    let diagram = engine.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&diagram)?);
        return Ok(());
    }

    println!("diagram {}", engine.diagram_id());
    for class in &diagram.classes {
        println!("  class {} [{}] at ({}, {})", class.name, class.id, class.position.x, class.position.y);
        for attribute in &class.attributes {
            println!("    {attribute}");
        }
        for method in &class.methods {
            println!("    {method}");
        }
    }
    for link in &diagram.links {
        println!(
            "  {} {} -> {} [{}] ({} / {})",
            link.link_type,
            class_name(&diagram, link.source.id()),
            class_name(&diagram, link.target.id()),
            link.id,
            link.source_multiplicity,
            link.target_multiplicity,
        );
    }
    Ok(())
}

/// Name of an endpoint class; link endpoints print as `link`
fn class_name<'a>(diagram: &'a Diagram, id: &DurableId) -> &'a str {
    diagram.class(id).map_or("link", |c| c.name.as_str())
}
