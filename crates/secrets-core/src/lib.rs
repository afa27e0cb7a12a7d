//! secrets_core - encrypted single-user record store engine
//!
//! A store is a schema (ordered field definitions) plus records keyed by
//! stable numeric ids, persisted as one authenticated, encrypted file.
//!
//! # Module layout
//! - `schema`     - field definitions and the `Name+mh` declaration syntax
//! - `record`     - one entry: id, timestamps, field values
//! - `store`      - in-memory collection: add / remove / modify / search / sort
//! - `search`     - regex matching with per-field spans
//! - `codec`      - plaintext payload encoding
//! - `crypto`     - Argon2id key derivation, XChaCha20-Poly1305 sealing
//! - `envelope`   - on-disk header layout and seal/open of a whole payload
//! - `store_file` - create / open / save / destroy / rotate with atomic writes
//! - `key_cache`  - optional OS keyring cache of derived keys
//! - `paths`      - default location of named stores
//! - `error`      - unified error type

pub mod codec;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod key_cache;
pub mod paths;
pub mod record;
pub mod schema;
pub mod search;
pub mod store;
pub mod store_file;

pub use crypto::{Credential, KdfParams, StoreKey};
pub use error::{Result, StoreError};
pub use key_cache::{KeyCache, KeyringCache, MemoryKeyCache};
pub use record::{Record, Values};
pub use schema::{FieldDefinition, Schema};
pub use search::{FieldMatch, SearchHit, SearchOptions};
pub use store::{SortKey, Store};
pub use store_file::StoreFile;
