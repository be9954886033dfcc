//! Loading the service dependants document from disk

use std::path::Path;

use crate::config::ServiceDependants;
use crate::error::{Error, Result};

/// Read and decode the service dependants document at `path`.
///
/// Performs exactly one file read. Read failures surface as
/// [`Error::ReadError`], malformed or mismatched documents as
/// [`Error::DecodeError`]. Nothing is cached; callers decide whether to load
/// once or reload.
pub fn load_service_dependants(path: impl AsRef<Path>) -> Result<ServiceDependants> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|source| Error::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    decode_service_dependants(&data)
}

pub fn decode_service_dependants(data: &str) -> Result<ServiceDependants> {
    Ok(serde_yaml::from_str(data)?)
}
