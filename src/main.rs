use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use log::{LevelFilter, info};
use tokio::net::TcpListener;

use roomcast::api::{self, AppState};
use roomcast::auth::IdentityGate;
use roomcast::cache::HotCache;
use roomcast::registry::RoomRegistry;
use roomcast::relay::Relay;
use roomcast::settings::Settings;
use roomcast::store::{ChatDb, DurableLog, SqliteLog};

const APP_NAME: &str = "roomcast";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common);

    match cli.command {
        Command::Serve(cmd) => run_serve(cli.common, cmd),
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), APP_NAME, &mut io::stdout());
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Roomcast - room-based real-time message relay.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the relay server
    Serve(ServeCommand),
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Path of the SQLite database file
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
}

fn init_logging(common: &CommonOpts) {
    let level = if common.quiet {
        LevelFilter::Error
    } else if common.trace {
        LevelFilter::Trace
    } else {
        match common.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.as_str()),
    )
    .init();
}

#[tokio::main]
async fn run_serve(common: CommonOpts, cmd: ServeCommand) -> Result<()> {
    let mut settings = Settings::load(common.config.as_deref())?;
    if let Some(host) = cmd.host {
        settings.host = host;
    }
    if let Some(port) = cmd.port {
        settings.port = port;
    }
    if let Some(database) = cmd.database {
        settings.database_path = database;
    }
    if settings.jwt_secret.is_empty() {
        anyhow::bail!("jwt_secret must be configured (config file or ROOMCAST_JWT_SECRET)");
    }

    let db = ChatDb::open(&settings.database_path).await?;
    let log: Arc<dyn DurableLog> = Arc::new(SqliteLog::new(db));
    let cache = Arc::new(HotCache::new(settings.cache_capacity));
    let registry = Arc::new(RoomRegistry::new());
    let relay = Arc::new(Relay::new(
        log.clone(),
        cache,
        registry.clone(),
        settings.retry_policy(),
        settings.history_limit,
    ));
    let gate = Arc::new(IdentityGate::new(
        &settings.jwt_secret,
        settings.admit_timeout(),
    ));
    let state = AppState::new(relay, registry, gate, log);

    let addr = settings.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, api::router(state))
        .await
        .context("serving")?;

    Ok(())
}
