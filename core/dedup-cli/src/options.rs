//! `tab-dedup options`: initializes the options file and prints it.

use std::path::{Path, PathBuf};

use tab_dedup_core::{default_options_path, initialize_options, StoredOptions};

use crate::input::{self, CliError, Result};

pub fn run(path: Option<&Path>) -> Result<()> {
    let path = resolve_path(path)?;
    let stored = load_and_persist(&path)?;
    tracing::debug!(path = %path.display(), "Options initialized");
    input::print_json(&stored)
}

fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => default_options_path().ok_or(CliError::NoOptionsPath),
    }
}

/// Loads, reconciles and writes back the options, then checks that they
/// produce a usable snapshot.
fn load_and_persist(path: &Path) -> Result<StoredOptions> {
    let stored = initialize_options(path)?;
    stored.to_options()?;
    Ok(stored)
}
