// Entrypoint for the CLI application.
// - With a FILE argument, uploads it once and exits.
// - Without one, starts the interactive menu.

use anyhow::{Context, Result};
use clap::Parser;
use pinata_uploader::config::{log_filter, timeout_from_secs, Config};
use pinata_uploader::input::{default_display_name, resolve_path};
use pinata_uploader::ui::{main_menu, print_outcome, upload_with_spinner};
use pinata_uploader::{PinataClient, UploadRequest};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pinata-upload")]
#[command(about = "Pin a local file to IPFS through the Pinata gateway")]
#[command(version)]
struct Cli {
    /// File to upload, relative to the base directory or absolute.
    /// Omit it to pick files interactively.
    file: Option<String>,

    /// Name recorded in the pin metadata (defaults to the file name)
    #[arg(short, long)]
    name: Option<String>,

    /// Description recorded in the pin metadata
    #[arg(short, long, default_value = "")]
    description: String,

    /// Directory relative file names are resolved against
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Whole-request timeout in seconds, body upload included; 0 or
    /// unset for none
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(dir) = cli.base_dir {
        config.files_dir = dir;
    }
    if let Some(secs) = cli.timeout_secs {
        config.timeout = timeout_from_secs(secs);
    }

    // Logs go to stderr so stdout carries only the upload result.
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&config.log_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let client = PinataClient::new(&config.api_url, config.timeout)
        .context("Failed to build HTTP client")?;

    match cli.file {
        Some(file) => {
            let path = resolve_path(&config.files_dir, &file)?;
            let name = cli.name.unwrap_or_else(|| default_display_name(&path));
            let request = UploadRequest::new(path, name, cli.description);
            let outcome = upload_with_spinner(&client, &request, &config.credentials).await?;
            print_outcome(&outcome);
            if outcome.is_err() {
                std::process::exit(1);
            }
        }
        None => main_menu(&client, &config.credentials, &config.files_dir).await?,
    }
    Ok(())
}
