use anyhow::{bail, Context, Result};
use awsprov::config::ProviderConfig;
use awsprov::manifest::{self, Manifest};
use awsprov::provider::ResourceContext;
use awsprov::resource::registry;
use awsprov::state::{Address, StateFile};
use awsprov::sweep::{self, SweepOptions};
use awsprov::{service, VERSION};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Typed AWS resource providers
#[derive(Parser, Debug)]
#[command(name = "awsprov", version = VERSION, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// AWS region to use
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Credentials profile to use
    #[arg(short, long, global = true)]
    profile: Option<String>,

    /// Endpoint used for every service (e.g. a local emulator)
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// Resource manifest (YAML)
    #[arg(short, long, global = true, default_value = "awsprov.yaml")]
    manifest: PathBuf,

    /// State file (JSON)
    #[arg(short, long, global = true, default_value = "awsprov.state.json")]
    state: PathBuf,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered resource types
    Resources,
    /// Print a resource type's schema as JSON
    Schema { type_name: String },
    /// Show the changes apply would make
    Plan,
    /// Converge remote resources onto the manifest
    Apply,
    /// Re-read every resource in state
    Refresh,
    /// Adopt an existing resource under an address
    Import { address: String, id: String },
    /// Destroy every resource in state
    Destroy,
    /// Delete leftover test resources by name prefix
    Sweep {
        #[arg(long, default_value = sweep::DEFAULT_PREFIX)]
        prefix: String,
        #[arg(long, default_value_t = sweep::DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Only run these sweepers (resource type names)
        #[arg(long)]
        only: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", log_path.display());
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("awsprov {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("awsprov").join("awsprov.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".awsprov").join("awsprov.log");
    }
    PathBuf::from("awsprov.log")
}

fn provider_config(args: &Args) -> ProviderConfig {
    let mut config = ProviderConfig::load();
    if let Some(region) = &args.region {
        config.region = region.clone();
    }
    if let Some(profile) = &args.profile {
        config.profile = Some(profile.clone());
    }
    if let Some(url) = &args.endpoint_url {
        config.endpoint_url = Some(url.clone());
    }
    config
}

fn context(args: &Args) -> Result<ResourceContext> {
    let config = provider_config(args);
    tracing::debug!("Using region {}", config.region);
    ResourceContext::from_config(&config).context("Failed to initialize provider")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn save_state(state: &StateFile, path: &Path) -> Result<()> {
    state.save(path)?;
    tracing::debug!("State saved to {}", path.display());
    Ok(())
}

fn list_resources() {
    for package in registry::service_packages() {
        println!("{}", package.name);
        for registration in package.resources {
            let tagged = if registration.tags.is_some() { " (tags)" } else { "" };
            println!("  {:<28} {}{}", registration.type_name, registration.name, tagged);
        }
    }
}

fn report_summary(summary: &manifest::ApplySummary) -> Result<()> {
    println!(
        "{} created, {} updated, {} replaced, {} destroyed",
        summary.created, summary.updated, summary.replaced, summary.destroyed
    );
    if !summary.is_success() {
        for error in &summary.errors {
            eprintln!("Error: {error}");
        }
        bail!("{} resource(s) failed", summary.errors.len());
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    match &args.command {
        Command::Resources => {
            list_resources();
            Ok(())
        }
        Command::Schema { type_name } => {
            let resource = registry::new_resource(type_name)?;
            print_json(&resource.schema())
        }
        Command::Plan => {
            let manifest = Manifest::load(&args.manifest)?;
            let mut state = StateFile::load(&args.state)?;
            let changes = manifest.plan(&context(&args)?, &mut state).await?;
            let pending: Vec<_> = changes.iter().filter(|c| !c.action.is_noop()).collect();
            if pending.is_empty() {
                println!("No changes.");
            }
            for change in pending {
                println!("{}: {}", change.address, change.action);
            }
            Ok(())
        }
        Command::Apply => {
            let manifest = Manifest::load(&args.manifest)?;
            let mut state = StateFile::load(&args.state)?;
            let result = manifest.apply(&context(&args)?, &mut state).await;
            save_state(&state, &args.state)?;
            report_summary(&result?)
        }
        Command::Refresh => {
            let mut state = StateFile::load(&args.state)?;
            let result = manifest::refresh(&context(&args)?, &mut state).await;
            save_state(&state, &args.state)?;
            result?;
            println!("{} resource(s) in state", state.resources.len());
            Ok(())
        }
        Command::Import { address, id } => {
            let address: Address = address.parse()?;
            let mut state = StateFile::load(&args.state)?;
            manifest::import(&context(&args)?, &mut state, &address, id).await?;
            save_state(&state, &args.state)?;
            println!("Imported {address} ({id})");
            Ok(())
        }
        Command::Destroy => {
            let manifest = if args.manifest.exists() {
                Manifest::load(&args.manifest)?
            } else {
                Manifest::default()
            };
            let mut state = StateFile::load(&args.state)?;
            let result = manifest.destroy(&context(&args)?, &mut state).await;
            save_state(&state, &args.state)?;
            report_summary(&result?)
        }
        Command::Sweep {
            prefix,
            concurrency,
            only,
        } => {
            let ctx = context(&args)?;
            let sweepers: Vec<_> = service::sweepers()
                .into_iter()
                .filter(|s| only.is_empty() || only.iter().any(|o| o == s.name))
                .collect();
            let options = SweepOptions {
                prefix: prefix.clone(),
                concurrency: *concurrency,
            };
            let report = sweep::run(&ctx, &sweepers, &options).await?;
            print_json(&report)?;
            if !report.is_success() {
                bail!("{} sweep error(s)", report.errors.len());
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let result = run(args).await;
    if let Err(err) = &result {
        tracing::error!("{:#}", err);
    }
    result
}
