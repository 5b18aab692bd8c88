//! Reading and writing step files

use pgb_errors::{ConfigError, Error};
use pgb_types::StepDefinition;
use std::path::Path;
use tokio::fs;

/// Load a step definition from a TOML file
///
/// # Errors
///
/// Returns an error if the file is missing or does not parse.
pub async fn load_step(path: &Path) -> Result<StepDefinition, Error> {
    let contents = fs::read_to_string(path)
        .await
        .map_err(|_| ConfigError::NotFound {
            path: path.display().to_string(),
        })?;
    StepDefinition::from_toml_str(&contents)
}

/// Write a step definition back to disk
///
/// The file is replaced through a sibling temp file so a crash never leaves
/// a truncated step file behind.
///
/// # Errors
///
/// Returns an error if serialization or any filesystem operation fails.
pub async fn save_step(path: &Path, def: &StepDefinition) -> Result<(), Error> {
    let contents = def.to_toml_string()?;
    let tmp = path.with_extension("toml.tmp");

    let write_err = |e: std::io::Error| -> Error {
        ConfigError::WriteError {
            path: path.display().to_string(),
            error: e.to_string(),
        }
        .into()
    };

    fs::write(&tmp, contents).await.map_err(write_err)?;
    fs::rename(&tmp, path).await.map_err(write_err)?;
    tracing::debug!("wrote step file {}", path.display());
    Ok(())
}
