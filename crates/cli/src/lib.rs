use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod commands;

/// Canonicalize the root path if possible, falling back to the given string
/// relative to the current working directory.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        // Canonicalization fails for paths that do not exist yet.
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Default `tracing` filter directive for the given verbosity.
///
/// `RUST_LOG` takes precedence when set.
pub fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "scriptgraph=debug,scriptgraph_core=debug"
    } else {
        "warn"
    }
}
