// Runtime configuration. Values come from environment variables; the key
// pair may instead live in `~/.pinata.json` so it does not have to be
// exported in every shell.

use crate::api::{Credentials, PINATA_API_URL};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILES_DIR: &str = "./ipfs-files/files";
pub const DEFAULT_LOG_LEVEL: &str = "warn";
const KEYS_FILE_NAME: &str = ".pinata.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    /// Gateway base URL; the pinning path is appended by the client.
    pub api_url: String,
    /// Directory interactive file names are resolved against.
    pub files_dir: PathBuf,
    /// Whole-request deadline, body upload included. Off unless
    /// `PINATA_TIMEOUT_SECS` is set, so large files are never cut off.
    pub timeout: Option<Duration>,
    /// Filter directives, taken from `RUST_LOG`.
    pub log_level: String,
}

/// Shape of the optional key file.
#[derive(Deserialize, Debug)]
struct KeysFile {
    api_key: String,
    api_secret: String,
}

impl Config {
    /// Load configuration from the process environment, falling back to
    /// `~/.pinata.json` for the key pair.
    pub fn from_env() -> Result<Self> {
        let keys_file = dirs::home_dir().map(|h| h.join(KEYS_FILE_NAME));
        Self::from_lookup(|k| std::env::var(k).ok(), keys_file.as_deref())
    }

    /// Same as `from_env` with an injectable variable source.
    pub fn from_lookup<F>(lookup: F, keys_file: Option<&Path>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = match (lookup("PINATA_API_KEY"), lookup("PINATA_SECRET_API_KEY")) {
            (Some(api_key), Some(api_secret)) => Credentials::new(api_key, api_secret),
            _ => load_keys_file(keys_file)?,
        };

        let timeout = match lookup("PINATA_TIMEOUT_SECS") {
            Some(v) => timeout_from_secs(
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("PINATA_TIMEOUT_SECS is not a number: {v}"))?,
            ),
            None => None,
        };

        Ok(Config {
            credentials,
            api_url: lookup("PINATA_API_URL").unwrap_or_else(|| PINATA_API_URL.into()),
            files_dir: lookup("PINATA_FILES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FILES_DIR)),
            timeout,
            log_level: lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_LEVEL.into()),
        })
    }
}

/// `0` means no timeout.
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Filter for the log subscriber. Directives that do not parse fall back
/// to `DEFAULT_LOG_LEVEL`.
pub fn log_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

fn load_keys_file(path: Option<&Path>) -> Result<Credentials> {
    let path = path.context(
        "PINATA_API_KEY and PINATA_SECRET_API_KEY are not set and no home directory was found",
    )?;
    let data = std::fs::read_to_string(path).with_context(|| {
        format!(
            "PINATA_API_KEY and PINATA_SECRET_API_KEY are not set and {} could not be read",
            path.display()
        )
    })?;
    let keys: KeysFile =
        serde_json::from_str(&data).with_context(|| format!("Parsing {}", path.display()))?;
    Ok(Credentials::new(keys.api_key, keys.api_secret))
}
