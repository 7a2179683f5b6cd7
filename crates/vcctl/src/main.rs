use miette::Result;
use tokio::io::BufReader;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use vc_manager::{BackendTag, Endpoint};

mod cli;
mod commands;
mod config;
mod report;
mod session;

use cli::Cli;
use commands::Session;
use config::{FileConfig, Settings};

const BANNER: &str = "Welcome to vcctl, the virtualization management console";
const FAREWELL: &str = "Thank you for using vcctl. Goodbye!";

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();

    let cli = Cli::parse_args();
    let file = FileConfig::load(cli.config.as_deref()).await?;
    let settings = Settings::resolve(&cli, file)?;

    println!("{BANNER}");
    let endpoint = session::connect(&settings).await?;
    match (endpoint.backend(), &settings.credentials) {
        (BackendTag::VSphere, Some(creds)) => {
            println!("Successfully connected to {} as {}", creds.endpoint, creds.username);
        }
        (backend, _) => println!("Successfully connected to the {backend} endpoint"),
    }
    println!("Type help for the list of commands.");

    let session = Session::new(endpoint, settings.executor);
    let mut stdout = tokio::io::stdout();
    let outcome = session::run(&session, BufReader::new(tokio::io::stdin()), &mut stdout).await;

    if let Err(e) = session.endpoint().logout().await {
        warn!(error = %e, "logout failed");
    }
    println!("{FAREWELL}");
    outcome
}
