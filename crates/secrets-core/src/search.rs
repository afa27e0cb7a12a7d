//! Regular-expression search over record values.

use regex::{Regex, RegexBuilder};
use std::ops::Range;

use crate::error::Result;
use crate::record::Record;
use crate::schema::Schema;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict the scan to these fields (case-insensitive names). Empty
    /// means every field.
    pub fields: Vec<String>,
    pub ignore_case: bool,
}

impl SearchOptions {
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }
}

/// Byte ranges matched inside one field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub field: String,
    pub spans: Vec<Range<usize>>,
}

#[derive(Debug, Clone)]
pub struct SearchHit<'a> {
    pub record: &'a Record,
    pub matches: Vec<FieldMatch>,
}

impl SearchHit<'_> {
    pub fn spans_for(&self, field: &str) -> &[Range<usize>] {
        self.matches
            .iter()
            .find(|m| m.field == field)
            .map(|m| m.spans.as_slice())
            .unwrap_or(&[])
    }
}

pub(crate) fn compile(pattern: &str, ignore_case: bool) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()?)
}

/// Resolve the scanned field names against the schema, keeping schema order.
pub(crate) fn scanned_fields<'s>(schema: &'s Schema, requested: &[String]) -> Result<Vec<&'s str>> {
    if requested.is_empty() {
        return Ok(schema.names().collect());
    }
    let mut wanted = Vec::with_capacity(requested.len());
    for name in requested {
        wanted.push(schema.resolve(name)?.name.as_str());
    }
    Ok(schema
        .names()
        .filter(|name| wanted.contains(name))
        .collect())
}

pub(crate) fn scan<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    fields: &[&str],
    re: &Regex,
) -> Vec<SearchHit<'a>> {
    records
        .into_iter()
        .filter_map(|record| {
            let matches: Vec<FieldMatch> = fields
                .iter()
                .filter_map(|field| {
                    let value = record.value(field)?;
                    let spans: Vec<Range<usize>> = re.find_iter(value).map(|m| m.range()).collect();
                    (!spans.is_empty()).then(|| FieldMatch {
                        field: (*field).to_string(),
                        spans,
                    })
                })
                .collect();
            (!matches.is_empty()).then_some(SearchHit { record, matches })
        })
        .collect()
}
