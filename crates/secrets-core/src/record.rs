use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name -> value, keyed by the declared field spelling.
pub type Values = BTreeMap<String, String>;

/// One secret entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub values: Values,
}

impl Record {
    pub(crate) fn new(id: u64, values: Values) -> Self {
        let now = Utc::now();
        Self {
            id,
            created: now,
            modified: now,
            values,
        }
    }

    pub fn value(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Stamp a modification. The new stamp is strictly later than the old one
    /// even when the clock has not moved.
    pub(crate) fn touch(&mut self) {
        let now = Utc::now();
        self.modified = if now > self.modified {
            now
        } else {
            self.modified + Duration::microseconds(1)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_always_advances() {
        let mut record = Record::new(1, Values::new());
        let created = record.created;
        record.modified = Utc::now() + Duration::hours(1);
        let before = record.modified;
        record.touch();
        assert!(record.modified > before);
        assert_eq!(record.created, created);
    }
}
