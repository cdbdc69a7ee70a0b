use clap::{ArgAction, Parser, Subcommand};
use color_eyre::eyre::eyre;
use commands::{clear, config, download, push, status, sync, validate};
use std::path::PathBuf;
use watch_sync_models::{ContentFilter, PushMode, SyncMode};

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "emby-sync")]
#[command(about = "emby-sync - Copy your Emby watch history to Trakt")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Directory holding config.toml, watched.json and unmatched.json
    #[arg(long, global = true, env = "EMBY_SYNC_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Also write logs to this file (rotated daily)
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download watch history from Emby into the local snapshot
    #[command(long_about = "Fetch watched items from the Emby server and merge them into the local snapshot. Incremental mode only asks for items changed since the last sync; full mode re-reads everything.")]
    Download {
        /// full or incremental (defaults to [sync].mode)
        #[arg(long)]
        mode: Option<SyncMode>,

        /// movies, episodes or all
        #[arg(long, default_value = "all")]
        content: ContentFilter,
    },
    /// Push watched items from the local snapshot to Trakt
    #[command(long_about = "Resolve every fully watched snapshot item to a Trakt identity by external id and write it to the Trakt history according to the conflict policy. Items that cannot be matched are listed in unmatched.json.")]
    Push {
        /// skip, overwrite or merge (defaults to [sync].push_mode)
        #[arg(long)]
        mode: Option<PushMode>,

        /// movies, episodes or all
        #[arg(long, default_value = "all")]
        content: ContentFilter,

        /// Decide every write but send nothing and persist nothing
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,

        /// Only items not yet pushed at their current state
        #[arg(long, action = ArgAction::SetTrue)]
        pending_only: bool,
    },
    /// Download, then push everything still pending
    Sync {
        /// Download mode: full or incremental (defaults to [sync].mode)
        #[arg(long)]
        mode: Option<SyncMode>,

        /// Push policy: skip, overwrite or merge (defaults to [sync].push_mode)
        #[arg(long)]
        push_mode: Option<PushMode>,

        /// movies, episodes or all
        #[arg(long, default_value = "all")]
        content: ContentFilter,

        /// Download for real but only simulate the push
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Show local sync state (no network access)
    Status,
    /// Check the configured Emby and Trakt credentials
    Validate,
    /// Remove ALL watched movies and shows from the Trakt history
    #[command(long_about = "Remove every watched movie and show from the Trakt history of the configured account. This cannot be undone. The local snapshot is not touched.")]
    Clear {
        /// Confirm the removal
        #[arg(long, action = ArgAction::SetTrue)]
        yes: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration (masks sensitive data)
    Show {
        /// Show secrets unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },
    /// Print the files emby-sync reads and writes
    Path,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    logging::init_logging(cli.verbose, cli.quiet, cli.log_file.clone()).map_err(|e| eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);
    let ctx = commands::Context::new(cli.data_dir)?;

    match cli.command {
        Commands::Download { mode, content } => download::run_download(&ctx, mode, content, &output).await,
        Commands::Push {
            mode,
            content,
            dry_run,
            pending_only,
        } => push::run_push(&ctx, mode, content, dry_run, pending_only, &output).await,
        Commands::Sync {
            mode,
            push_mode,
            content,
            dry_run,
        } => sync::run_sync(&ctx, mode, push_mode, content, dry_run, &output).await,
        Commands::Status => status::run_status(&ctx, &output),
        Commands::Validate => validate::run_validate(&ctx, &output).await,
        Commands::Clear { yes } => clear::run_clear(&ctx, yes, &output).await,
        Commands::Config { cmd } => config::run_config(&ctx, cmd, &output),
    }
}
