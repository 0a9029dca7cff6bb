use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docketsync::{Error, Result, cmd, search::SortOrder};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the docketsync application
#[derive(Parser)]
#[command(name = "docketsync")]
#[command(about = "Keep a shared docket cache in step with the project-management system")]
#[command(version)]
struct Cli {
   #[arg(long, global = true, env = "DOCKETSYNC_CACHE", help = "Cache file or folder")]
   cache: Option<PathBuf>,

   #[command(subcommand)]
   command: Option<Cmd>,
}

/// Available subcommands for docketsync
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Bring the shared cache up to date")]
   Sync {
      #[arg(long, help = "Skip the freshness check and refetch everything")]
      full: bool,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Search cached dockets")]
   Search {
      #[arg(help = "Search terms (all must match)", default_value = "")]
      query: String,

      #[arg(
         short = 's',
         long,
         default_value = "recent",
         help = "Sort order (recent|number-asc|number-desc|name-asc|name-desc)"
      )]
      sort: SortOrder,

      #[arg(short = 'm', long, default_value = "25", help = "Maximum results (0 = all)")]
      limit: usize,

      #[arg(long, help = "Sync before searching")]
      sync: bool,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Show cache health and the next sync strategy")]
   Status {
      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Remove an unusable cache so the next sync rebuilds it")]
   Repair {
      #[arg(long, help = "Also remove a readable cache, resetting its history")]
      force: bool,
   },

   #[command(about = "Print the resolved cache and config paths")]
   Path,
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
      .with_writer(std::io::stderr)
      .init();

   let cli = Cli::parse();
   if let Err(err) = run(cli).await {
      if !matches!(err, Error::Reported { .. }) {
         eprintln!("{err}");
      }
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   match cli.command {
      Some(Cmd::Sync { full, json }) => cmd::sync::execute(full, json, cli.cache).await,
      Some(Cmd::Search { query, sort, limit, sync, json }) => {
         cmd::search::execute(query, sort, limit, sync, json, cli.cache).await
      },
      Some(Cmd::Status { json }) => cmd::status::execute(json, cli.cache),
      Some(Cmd::Repair { force }) => cmd::repair::execute(force, cli.cache),
      Some(Cmd::Path) => cmd::path::execute(cli.cache),
      None => Err(Error::Server { op: "cli", reason: "no command provided".to_string() }),
   }
}
