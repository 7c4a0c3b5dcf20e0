// UI layer: an interactive menu using `dialoguer`, plus the shared
// reporting used by the one-shot command line mode.

use crate::api::{Credentials, PinataClient, PinnedFile, UploadRequest};
use crate::error::UploadError;
use crate::input::{default_display_name, resolve_path};
use anyhow::Result;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Main interactive menu. Loops until the user chooses "Exit".
pub async fn main_menu(
    client: &PinataClient,
    credentials: &Credentials,
    files_dir: &Path,
) -> Result<()> {
    loop {
        let selection = off_runtime(|| {
            let items = vec!["Upload a file", "Exit"];
            Ok(Select::new().items(&items).default(0).interact()?)
        })
        .await?;
        match selection {
            0 => {
                // A bad file name or a failed upload is reported and the
                // menu is shown again.
                let dir = files_dir.to_path_buf();
                if let Some(request) = off_runtime(move || prompt_request(&dir)).await? {
                    let outcome = upload_with_spinner(client, &request, credentials).await?;
                    print_outcome(&outcome);
                }
            }
            _ => break,
        }
    }
    Ok(())
}

/// Run a blocking terminal interaction on the blocking pool so the async
/// runtime stays free while the user types.
pub async fn off_runtime<T, F>(interaction: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(interaction).await?
}

/// Ask for a file name and its labels. Returns `None` when the file does
/// not exist.
fn prompt_request(files_dir: &Path) -> Result<Option<UploadRequest>> {
    let file_name: String = Input::new()
        .with_prompt(format!("File name (in {})", files_dir.display()))
        .interact_text()?;

    let path = match resolve_path(files_dir, &file_name) {
        Ok(p) => p,
        Err(e) => {
            println!("{}", e);
            return Ok(None);
        }
    };

    let name: String = Input::new()
        .with_prompt("Name")
        .default(default_display_name(&path))
        .interact_text()?;
    let description: String = Input::new()
        .with_prompt("Description")
        .allow_empty(true)
        .interact_text()?;

    Ok(Some(UploadRequest::new(path, name, description)))
}

/// Run one upload behind a spinner. The spinner is cleared before
/// returning so the outcome prints on a clean line.
pub async fn upload_with_spinner(
    client: &PinataClient,
    request: &UploadRequest,
    credentials: &Credentials,
) -> Result<Result<PinnedFile, UploadError>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("Uploading {}...", request.file_path.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = client.upload(request, credentials).await;
    spinner.finish_and_clear();
    Ok(outcome)
}

/// Print an upload outcome the way the user expects to read it: the CID
/// on success, the gateway's raw body on rejection, the cause otherwise.
pub fn print_outcome(outcome: &Result<PinnedFile, UploadError>) {
    match outcome {
        Ok(pinned) => {
            println!("File uploaded to IPFS: {}", pinned.cid);
            if let Ok(pretty) = serde_json::to_string_pretty(&pinned.payload) {
                println!("{}", pretty);
            }
        }
        Err(UploadError::HttpFailure { status, body }) => {
            eprintln!("Error uploading file ({}): {}", status, body);
        }
        Err(e) if e.is_transport() => eprintln!("Request error: {}", e),
        Err(e) => eprintln!("Upload failed: {}", e),
    }
}
