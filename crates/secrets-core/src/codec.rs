//! Plaintext payload encoding.
//!
//! The payload is a JSON document; string escaping keeps arbitrary values
//! (quotes, commas, newlines, braces) from ever being read back as structure.
//! `values` maps are ordered, so the same store always encodes to the same
//! bytes.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, StoreError};
use crate::record::Record;
use crate::schema::{FieldDefinition, Schema};
use crate::store::Store;

pub const PAYLOAD_FORMAT: u32 = 1;

#[derive(Serialize)]
struct PayloadOut<'a> {
    format: u32,
    schema: &'a Schema,
    next_id: u64,
    records: &'a [Record],
}

#[derive(Deserialize)]
struct PayloadIn {
    format: u32,
    schema: Vec<FieldDefinition>,
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    records: Vec<Record>,
}

pub fn encode(store: &Store) -> Result<Zeroizing<Vec<u8>>> {
    let payload = PayloadOut {
        format: PAYLOAD_FORMAT,
        schema: store.schema(),
        next_id: store.next_id(),
        records: store.records(),
    };
    let bytes = serde_json::to_vec(&payload)
        .map_err(|e| StoreError::corrupted(format!("encode payload: {e}")))?;
    Ok(Zeroizing::new(bytes))
}

pub fn decode(bytes: &[u8]) -> Result<Store> {
    let payload: PayloadIn = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::corrupted(format!("parse payload: {e}")))?;
    if payload.format != PAYLOAD_FORMAT {
        return Err(StoreError::corrupted(format!(
            "payload format {} not understood",
            payload.format
        )));
    }
    let schema = Schema::new(payload.schema)
        .map_err(|e| StoreError::corrupted(format!("invalid schema: {e}")))?;
    Store::from_parts(schema, payload.records, payload.next_id)
}
