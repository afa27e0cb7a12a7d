//! In-memory store: one schema plus the ordered records that conform to it.
//!
//! Every mutating operation validates first and only then touches state, so a
//! failed call leaves the store exactly as it was.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::record::{Record, Values};
use crate::schema::Schema;
use crate::search::{self, SearchHit, SearchOptions};

pub const SORT_CREATED: &str = "created";
pub const SORT_MODIFIED: &str = "modified";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    schema: Schema,
    records: Vec<Record>,
    next_id: u64,
}

/// What a sort orders by, resolved against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Field(String),
    Created,
    Modified,
}

impl SortKey {
    /// Schema fields win over the reserved timestamp keys.
    pub fn resolve(schema: &Schema, name: &str) -> Result<Self> {
        if let Some(field) = schema.field(name) {
            return Ok(SortKey::Field(field.name.clone()));
        }
        let name = name.trim();
        if name.eq_ignore_ascii_case(SORT_CREATED) {
            Ok(SortKey::Created)
        } else if name.eq_ignore_ascii_case(SORT_MODIFIED) {
            Ok(SortKey::Modified)
        } else {
            Err(StoreError::validation(format!("cannot sort by unknown field '{name}'")))
        }
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        match self {
            SortKey::Field(field) => a
                .value(field)
                .unwrap_or_default()
                .cmp(b.value(field).unwrap_or_default()),
            SortKey::Created => a.created.cmp(&b.created),
            SortKey::Modified => a.modified.cmp(&b.modified),
        }
    }

    /// Stable sort; `reverse` flips the stably sorted sequence.
    pub fn sort<'a>(&self, records: &mut Vec<&'a Record>, reverse: bool) {
        records.sort_by(|a, b| self.compare(a, b));
        if reverse {
            records.reverse();
        }
    }
}

impl Store {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            records: Vec::new(),
            next_id: 1,
        }
    }

    /// Rebuild a store from decoded parts, checking every invariant.
    pub(crate) fn from_parts(schema: Schema, records: Vec<Record>, next_id: u64) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for record in &records {
            if !seen.insert(record.id) {
                return Err(StoreError::corrupted(format!("duplicate id {}", record.id)));
            }
            if record.id == 0 {
                return Err(StoreError::corrupted("record id 0"));
            }
            if record.modified < record.created {
                return Err(StoreError::corrupted(format!(
                    "record {} modified before it was created",
                    record.id
                )));
            }
            for name in record.values.keys() {
                match schema.field(name) {
                    Some(field) if field.name == *name => {}
                    _ => {
                        return Err(StoreError::corrupted(format!(
                            "record {} has undeclared field '{name}'",
                            record.id
                        )))
                    }
                }
            }
            if let Some(field) = missing_mandatory(&schema, &record.values) {
                return Err(StoreError::corrupted(format!(
                    "record {} lacks mandatory field '{field}'",
                    record.id
                )));
            }
        }
        let floor = match seen.last() {
            None => 1,
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| StoreError::corrupted(format!("record id {max} out of range")))?,
        };
        Ok(Self {
            schema,
            records,
            next_id: next_id.max(floor),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: u64) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Append a new record built from `values` and return its id.
    pub fn add<I, K, V>(&mut self, values: I) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut resolved = Values::new();
        self.merge_values(&mut resolved, values)?;
        if let Some(field) = missing_mandatory(&self.schema, &resolved) {
            return Err(StoreError::validation(format!(
                "mandatory field '{field}' is missing or empty"
            )));
        }
        let id = self.next_id;
        let next_id = id
            .checked_add(1)
            .ok_or_else(|| StoreError::validation("no record ids left in this store"))?;
        self.records.push(Record::new(id, resolved));
        self.next_id = next_id;
        debug!(id, "secret added");
        Ok(id)
    }

    /// Remove every listed id, or nothing at all if any is absent.
    pub fn remove(&mut self, ids: &[u64]) -> Result<usize> {
        let wanted: BTreeSet<u64> = ids.iter().copied().collect();
        let missing: Vec<u64> = wanted
            .iter()
            .copied()
            .filter(|id| self.get(*id).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::NotFound(missing));
        }
        let before = self.records.len();
        self.records.retain(|r| !wanted.contains(&r.id));
        let removed = before - self.records.len();
        debug!(removed, "secrets removed");
        Ok(removed)
    }

    /// Apply a partial update to record `id`; unspecified fields keep their
    /// values.
    pub fn modify<I, K, V>(&mut self, id: u64, values: I) -> Result<&Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let index = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(vec![id]))?;
        let mut updated = self.records[index].values.clone();
        self.merge_values(&mut updated, values)?;
        if let Some(field) = missing_mandatory(&self.schema, &updated) {
            return Err(StoreError::validation(format!(
                "mandatory field '{field}' cannot be empty"
            )));
        }
        let record = &mut self.records[index];
        record.values = updated;
        record.touch();
        debug!(id, "secret modified");
        Ok(record)
    }

    /// Drop every record; the schema and the id counter are kept.
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    /// Regex search with default options over `fields` (all when `None`).
    pub fn search(&self, pattern: &str, fields: Option<&[&str]>) -> Result<Vec<SearchHit<'_>>> {
        let mut options = SearchOptions::default();
        if let Some(fields) = fields {
            options = options.fields(fields.iter().copied());
        }
        self.search_with(pattern, &options)
    }

    pub fn search_with(&self, pattern: &str, options: &SearchOptions) -> Result<Vec<SearchHit<'_>>> {
        let re = search::compile(pattern, options.ignore_case)?;
        let fields = search::scanned_fields(&self.schema, &options.fields)?;
        Ok(search::scan(&self.records, &fields, &re))
    }

    /// A sorted view of the records; the store itself is not reordered.
    pub fn sorted(&self, field: &str, reverse: bool) -> Result<Vec<&Record>> {
        let key = SortKey::resolve(&self.schema, field)?;
        let mut view: Vec<&Record> = self.records.iter().collect();
        key.sort(&mut view, reverse);
        Ok(view)
    }

    /// Copy `values` into `target`, mapping each name to its declared spelling.
    /// Unknown names abort before anything is written to `target`.
    fn merge_values<I, K, V>(&self, target: &mut Values, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut staged = Vec::new();
        for (name, value) in values {
            let field = self.schema.resolve(name.as_ref())?;
            staged.push((field.name.clone(), value.into()));
        }
        target.extend(staged);
        Ok(())
    }
}

fn missing_mandatory<'s>(schema: &'s Schema, values: &Values) -> Option<&'s str> {
    schema
        .fields()
        .iter()
        .filter(|f| f.mandatory)
        .find(|f| values.get(&f.name).map_or(true, |v| v.is_empty()))
        .map(|f| f.name.as_str())
}
