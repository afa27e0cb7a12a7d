use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StoreError};

pub const ATTR_SEPARATOR: char = '+';
pub const ATTR_HIDDEN: char = 'h';
pub const ATTR_MANDATORY: char = 'm';

const RESERVED_CHARS: [char; 3] = [',', '=', ATTR_SEPARATOR];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub mandatory: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            mandatory: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Parse the `Name+mh` notation: `m` marks the field mandatory, `h`
    /// hidden.
    pub fn parse(decl: &str) -> Result<Self> {
        let (name, attrs) = match decl.split_once(ATTR_SEPARATOR) {
            Some((name, attrs)) => (name, attrs),
            None => (decl, ""),
        };
        let mut field = FieldDefinition::new(name.trim());
        for attr in attrs.trim().chars() {
            match attr.to_ascii_lowercase() {
                ATTR_HIDDEN => field.hidden = true,
                ATTR_MANDATORY => field.mandatory = true,
                other => {
                    return Err(StoreError::validation(format!(
                        "unknown attribute '{other}' for field '{}'",
                        field.name
                    )))
                }
            }
        }
        Ok(field)
    }
}

impl FromStr for FieldDefinition {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.hidden || self.mandatory {
            write!(f, "{ATTR_SEPARATOR}")?;
            if self.mandatory {
                write!(f, "{ATTR_MANDATORY}")?;
            }
            if self.hidden {
                write!(f, "{ATTR_HIDDEN}")?;
            }
        }
        Ok(())
    }
}

/// Ordered field list, fixed when the store is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldDefinition>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDefinition>) -> Result<Self> {
        if fields.is_empty() {
            return Err(StoreError::validation("a store needs at least one field"));
        }
        for (i, field) in fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(StoreError::validation("field names cannot be empty"));
            }
            if field.name.contains(RESERVED_CHARS) {
                return Err(StoreError::validation(format!(
                    "field name '{}' contains one of {:?}",
                    field.name, RESERVED_CHARS
                )));
            }
            if fields[..i]
                .iter()
                .any(|prev| prev.name.eq_ignore_ascii_case(&field.name))
            {
                return Err(StoreError::validation(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Build a schema from a comma separated list of `Name+attrs` specs.
    pub fn parse(decl: &str) -> Result<Self> {
        let fields = decl
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(FieldDefinition::parse)
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Case-insensitive lookup; the returned definition carries the declared
    /// spelling.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn resolve(&self, name: &str) -> Result<&FieldDefinition> {
        self.field(name)
            .ok_or_else(|| StoreError::validation(format!("unknown field '{name}'")))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attribute_notation() {
        let schema = Schema::parse("Site+m,Account,Password+mh,Other").unwrap();
        let fields = schema.fields();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], FieldDefinition::new("Site").mandatory());
        assert_eq!(fields[1], FieldDefinition::new("Account"));
        assert_eq!(fields[2], FieldDefinition::new("Password").mandatory().hidden());
        assert_eq!(fields[2].to_string(), "Password+mh");
        assert_eq!(fields[3].to_string(), "Other");
    }

    #[test]
    fn rejects_bad_definitions() {
        assert!(Schema::parse("").is_err());
        assert!(Schema::parse("Site,site").is_err());
        assert!(Schema::parse("Site+x").is_err());
        assert!(Schema::new(vec![FieldDefinition::new("a=b")]).is_err());
        assert!(Schema::new(vec![FieldDefinition::new("  ")]).is_err());
    }

    #[test]
    fn lookup_ignores_case() {
        let schema = Schema::parse("Site,Password+h").unwrap();
        assert_eq!(schema.resolve("password").unwrap().name, "Password");
        assert!(matches!(
            schema.resolve("Email"),
            Err(StoreError::Validation(_))
        ));
    }
}
