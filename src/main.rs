use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docsync::{Result, cmd};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the docsync application
#[derive(Parser)]
#[command(name = "docsync")]
#[command(about = "Sync a local policy-manual corpus to a remote document store, uploading only unseen content")]
#[command(version)]
struct Cli {
   #[command(subcommand)]
   command: Cmd,
}

/// Available subcommands for docsync
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Run a reconciliation pass over the corpus")]
   Sync {
      #[arg(help = "Corpus directory (default: configured corpus_dir)")]
      path: Option<PathBuf>,

      #[arg(long, help = "Show what would be uploaded without uploading")]
      dry_run: bool,

      #[arg(long, help = "Re-check synced entries against the remote catalog")]
      revalidate: bool,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Show index entry counts and the last pass summary")]
   Status {
      #[arg(long, help = "JSON output")]
      json: bool,

      #[arg(long, help = "Also list the remote catalog and report drift")]
      remote: bool,
   },

   #[command(about = "Resolve a document name to its remote handle")]
   Resolve {
      #[arg(help = "Local display name, e.g. eligibility.pdf")]
      name: String,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Remove the local index (remote documents are kept)")]
   Clean {
      #[arg(long, help = "Delete instead of dry-run")]
      force: bool,
   },
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
      .init();

   let cli = Cli::parse();
   if let Err(err) = run(cli).await {
      eprintln!("{err}");
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   match cli.command {
      Cmd::Sync { path, dry_run, revalidate, json } => {
         cmd::sync::execute(path, dry_run, revalidate, json).await
      },
      Cmd::Status { json, remote } => cmd::status::execute(json, remote).await,
      Cmd::Resolve { name, json } => cmd::resolve::execute(&name, json),
      Cmd::Clean { force } => cmd::clean::execute(force),
   }
}
