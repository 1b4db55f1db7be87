use clap::Parser;
use mason_repo::{RepoOptions, Store};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mason-repo", about = "Artifact repository for mason publish targets")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8081)]
    port: u16,

    /// Directory mirroring uploaded artifacts.
    #[arg(long, default_value = "./mason-repo-data")]
    data_dir: PathBuf,

    /// Require basic auth with this username for uploads.
    #[arg(long, requires = "password")]
    username: Option<String>,

    #[arg(long, requires = "username")]
    password: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let options = RepoOptions {
        credentials: cli.username.zip(cli.password),
        data_dir: Some(cli.data_dir.clone()),
    };

    let store = match Store::new(options) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to open {}: {e}", cli.data_dir.display());
            return ExitCode::FAILURE;
        }
    };

    let addr = format!("0.0.0.0:{}", cli.port);
    info!("starting mason-repo on {addr}");
    info!("data directory: {}", cli.data_dir.display());

    if let Err(e) = mason_repo::run_server(&store, &addr) {
        error!("server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
