use anyhow::{anyhow, Context, Result};
use secrets_core::paths::{default_stores_dir, PATH_ENV};
use secrets_core::{KdfParams, KeyringCache, StoreFile};
use std::path::PathBuf;
use zeroize::Zeroizing;

use crate::GlobalArgs;

pub const KEY_ENV: &str = "SECRETS_GUARD_KEY";
pub const NO_KEYRING_ENV: &str = "SECRETS_GUARD_NO_KEYRING";
pub const KDF_MEMORY_ENV: &str = "SECRETS_GUARD_KDF_MEMORY_KIB";
pub const KDF_ITERATIONS_ENV: &str = "SECRETS_GUARD_KDF_ITERATIONS";
pub const KDF_PARALLELISM_ENV: &str = "SECRETS_GUARD_KDF_PARALLELISM";

/// Per-invocation settings: flag, then environment, then default.
pub struct Settings {
    pub stores_dir: PathBuf,
    pub key: Option<Zeroizing<String>>,
    pub use_keyring: bool,
    pub kdf: KdfParams,
}

impl Settings {
    pub fn resolve(args: &GlobalArgs) -> Result<Self> {
        Self::from_sources(args, |name| std::env::var(name).ok())
    }

    fn from_sources(args: &GlobalArgs, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let stores_dir = match args
            .path
            .clone()
            .or_else(|| non_empty(env(PATH_ENV)).map(PathBuf::from))
        {
            Some(dir) => dir,
            None => default_stores_dir()?,
        };

        let key = args
            .key
            .clone()
            .or_else(|| non_empty(env(KEY_ENV)))
            .map(Zeroizing::new);

        let use_keyring = !args.no_keyring && !env_flag(env(NO_KEYRING_ENV));

        let defaults = KdfParams::default();
        let kdf = KdfParams::new(
            env_u32(&env, KDF_MEMORY_ENV, defaults.memory_kib)?,
            env_u32(&env, KDF_ITERATIONS_ENV, defaults.iterations)?,
            env_u32(&env, KDF_PARALLELISM_ENV, defaults.parallelism)?,
        )
        .context("invalid key derivation settings")?;

        Ok(Self {
            stores_dir,
            key,
            use_keyring,
            kdf,
        })
    }

    pub fn store_file(&self, name: &str) -> Result<StoreFile> {
        Ok(StoreFile::in_dir(&self.stores_dir, name)?)
    }

    pub fn key_cache(&self) -> Option<KeyringCache> {
        self.use_keyring.then(KeyringCache::default)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn env_flag(value: Option<String>) -> bool {
    match value.as_deref().map(str::trim) {
        None | Some("") | Some("0") => false,
        Some(v) => !v.eq_ignore_ascii_case("false"),
    }
}

fn env_u32(env: &impl Fn(&str) -> Option<String>, name: &str, default: u32) -> Result<u32> {
    match non_empty(env(name)) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{name} must be a positive integer, got '{raw}'")),
    }
}
