use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod git;
mod prompt;
mod render;

use config::Settings;
use prompt::TerminalSource;
use secrets_core::KeyCache;

#[derive(Parser)]
#[command(name = "secrets", version)]
#[command(about = "Encrypt and decrypt private information (such as passwords)", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Directory holding the stores (default: ~/.secrets)
    #[arg(short, long, global = true)]
    pub path: Option<PathBuf>,

    /// Store key; prompted for when neither given nor cached
    #[arg(short, long, global = true)]
    pub key: Option<String>,

    /// Do not read or cache store keys in the OS keyring
    #[arg(long, global = true)]
    pub no_keyring: bool,

    /// Print debug output on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Display options shared by `show` and `grep`.
#[derive(Args, Debug, Default)]
pub struct ViewArgs {
    /// One `Field: value` line per field instead of a table
    #[arg(long)]
    pub no_table: bool,

    /// Also show when each secret was added and last modified
    #[arg(short, long)]
    pub when: bool,

    /// Order by a field, or by `created` / `modified`
    #[arg(long)]
    pub sort: Option<String>,

    /// Reverse the order
    #[arg(long)]
    pub reverse: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the stores found in the stores directory
    List,

    /// Create a new store
    Create {
        store: Option<String>,

        /// Comma separated field list, e.g. Site+m,Account,Password+mh,Other
        #[arg(short, long)]
        fields: Option<String>,
    },

    /// Delete a store
    Destroy { store: Option<String> },

    /// Change the key of a store
    Key {
        store: Option<String>,
        new_key: Option<String>,
    },

    /// Remove every secret of a store, keeping its fields
    Clear { store: Option<String> },

    /// Show the content of a store
    Show {
        store: Option<String>,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Regular expression search through a store
    Grep {
        store: Option<String>,
        pattern: Option<String>,

        /// Comma separated list of fields to search
        #[arg(short, long)]
        fields: Option<String>,

        #[arg(long)]
        case_sensitive: bool,

        /// Do not highlight matches
        #[arg(long)]
        no_color: bool,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Add a secret to a store
    Add {
        store: Option<String>,

        /// Field values as Field=value pairs separated by commas
        #[arg(long)]
        data: Option<String>,
    },

    /// Remove secrets by id
    Remove {
        store: Option<String>,

        /// Ids, separated by spaces or commas
        ids: Vec<String>,
    },

    /// Modify a secret
    Modify {
        store: Option<String>,
        id: Option<u64>,

        /// Field values as Field=value pairs separated by commas
        #[arg(long)]
        data: Option<String>,
    },

    /// Commit and push the stores directory to its git remote
    Push {
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Pull the stores directory from its git remote
    Pull,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::resolve(&cli.global)?;
    let keyring = settings.key_cache();
    let mut source = TerminalSource;
    let mut ctx = commands::Context::new(
        &settings,
        &mut source,
        keyring.as_ref().map(|cache| cache as &dyn KeyCache),
    );

    match cli.command {
        Commands::List => commands::list(&ctx),
        Commands::Create { store, fields } => commands::create(&mut ctx, store, fields),
        Commands::Destroy { store } => commands::destroy(&mut ctx, store),
        Commands::Key { store, new_key } => commands::change_key(&mut ctx, store, new_key),
        Commands::Clear { store } => commands::clear(&mut ctx, store),
        Commands::Show { store, view } => commands::show(&mut ctx, store, &view),
        Commands::Grep {
            store,
            pattern,
            fields,
            case_sensitive,
            no_color,
            view,
        } => commands::grep(
            &mut ctx,
            store,
            pattern,
            commands::GrepArgs {
                fields,
                case_sensitive,
                color: !no_color,
            },
            &view,
        ),
        Commands::Add { store, data } => commands::add(&mut ctx, store, data),
        Commands::Remove { store, ids } => commands::remove(&mut ctx, store, ids),
        Commands::Modify { store, id, data } => commands::modify(&mut ctx, store, id, data),
        Commands::Push { message } => git::push(&settings.stores_dir, message.as_deref()),
        Commands::Pull => git::pull(&settings.stores_dir),
    }
}
