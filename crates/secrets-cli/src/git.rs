//! Git sync of the stores directory. Runs around whole commands only; the
//! store engine knows nothing about it.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

pub fn push(dir: &Path, message: Option<&str>) -> Result<()> {
    ensure_dir(dir)?;
    let message = match message {
        Some(m) if !m.trim().is_empty() => m.to_string(),
        _ => default_message(),
    };
    debug!(dir = %dir.display(), %message, "pushing stores");

    git(dir, &["add", "."])?;
    if let Err(e) = git(dir, &["commit", "-m", &message]) {
        // git exits non-zero when there is nothing to commit
        warn!("commit skipped: {e:#}");
    }
    git(dir, &["push"])
}

pub fn pull(dir: &Path) -> Result<()> {
    ensure_dir(dir)?;
    debug!(dir = %dir.display(), "pulling stores");
    git(dir, &["pull"])
}

pub fn default_message() -> String {
    format!("Committed on {}", Local::now().format("%H:%M:%S %d/%m/%Y"))
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(anyhow!("stores directory does not exist ({})", dir.display()));
    }
    Ok(())
}

fn git(dir: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .context("cannot run git")?;
    if !status.success() {
        return Err(anyhow!("git {} failed ({status})", args.join(" ")));
    }
    Ok(())
}
