use directories::BaseDirs;
use std::path::PathBuf;

use crate::error::{Result, StoreError};

pub const STORES_DIR_NAME: &str = ".secrets";
pub const PATH_ENV: &str = "SECRETS_GUARD_PATH";

/// `~/.secrets`; `SECRETS_GUARD_PATH` overrides it at the CLI layer.
pub fn default_stores_dir() -> Result<PathBuf> {
    let dirs = BaseDirs::new()
        .ok_or_else(|| StoreError::validation("cannot determine home directory"))?;
    Ok(dirs.home_dir().join(STORES_DIR_NAME))
}
