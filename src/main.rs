//! Mount a chained, tiered filesystem over FUSE, served over HTTP.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::error;

mod app_config;
mod daemon;
mod preflight;

use crate::app_config::Config;
use remotefs::model::TierRole;

#[derive(Parser)]
#[command(
    version,
    about = "Chained tiered filesystem daemon: a FUSE mount in front, an HTTP facade behind."
)]
struct Args {
    /// Path to a YAML config file.
    #[arg(short, long, conflicts_with_all = ["master", "mount"])]
    config: Option<PathBuf>,

    /// Master directory to serve files from (legacy).
    #[arg(long)]
    master: Option<PathBuf>,

    /// Directory to mount the FUSE filesystem (legacy).
    #[arg(long)]
    mount: Option<PathBuf>,

    /// Server address (host:port) (legacy).
    #[arg(long, default_value = app_config::DEFAULT_SERVER_ADDR)]
    server: String,

    /// Filesystem role, `main` or `cache` (legacy).
    #[arg(long, default_value = "main")]
    role: String,

    /// Max cache size in bytes (legacy).
    #[arg(long = "cache-size", default_value_t = 1024 * 1024 * 1024)]
    cache_size: u64,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

fn load_config(args: &Args) -> Result<Config, String> {
    if let Some(path) = &args.config {
        return Config::load(path).map_err(|e| format!("Failed to load configuration: {e}"));
    }

    let master = args
        .master
        .clone()
        .ok_or("Must specify --master or provide a config file with --config")?;
    let mount = args
        .mount
        .clone()
        .ok_or("Must specify --mount or provide a config file with --config")?;
    let role = match args.role.as_str() {
        "main" => TierRole::Main,
        "cache" => TierRole::Cache,
        _ => return Err("Role must be either 'main' or 'cache'".to_owned()),
    };

    Config::legacy(master, mount, args.server.clone(), role, args.cache_size)
        .map_err(|e| e.to_string())
}

#[expect(
    clippy::exit,
    reason = "top-level entry point that intentionally terminates the process"
)]
fn main() {
    let args = Args::parse();
    init_tracing();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let tier_roots: Vec<&Path> = config
        .filesystems
        .iter()
        .map(|spec| spec.path.as_path())
        .collect();
    if let Err(e) = preflight::check_directory_permissions(tier_roots) {
        eprintln!("Permission check failed:\n\n{e}");
        std::process::exit(1);
    }
    if let Err(e) = preflight::ensure_fuse() {
        eprintln!("FUSE check failed:\n\n{e}");
        std::process::exit(1);
    }

    if let Err(e) = daemon::spawn(config) {
        error!(error = %e, "daemon failed");
        std::process::exit(1);
    }
}
