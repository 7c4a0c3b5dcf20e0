// Library root
// -----------
// Uploads a local file to the Pinata IPFS pinning gateway. The binary
// (`main.rs`) wires these modules into a command line tool.
//
// Module responsibilities:
// - `api`: the async uploader (`PinataClient::upload`) and its data types.
// - `form`: the multipart body, with the file streamed from disk.
// - `error`: the `UploadError` taxonomy.
// - `config`: credentials, endpoint and timeout from the environment.
// - `input`: resolving a typed file name to a validated path.
// - `ui`: the interactive menu and outcome reporting.
pub mod api;
pub mod config;
pub mod error;
pub mod form;
pub mod input;
pub mod ui;

pub use api::{Credentials, PinataClient, PinnedFile, UploadRequest};
pub use config::Config;
pub use error::UploadError;
