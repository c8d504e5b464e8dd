//! Mapping between hierarchical keys and the table's flat partition key.
//!
//! A hierarchical key such as `["users", "42", "name"]` is stored under the single
//! string `users.42.name`. Two encodings are available:
//!
//! - [`KeyEncoding::Dotted`] joins and splits on `.` with no escaping. A segment that
//!   itself contains `.` does not survive a round trip.
//! - [`KeyEncoding::Escaped`] escapes `.` and `\` inside segments with a leading `\`.
//!   Keys made of segments without either character encode exactly as `Dotted` does,
//!   so tables written with `Dotted` can be read with `Escaped`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between segments in a flat key
pub const DELIMITER: char = '.';

const ESCAPE: char = '\\';

/// Ordered sequence of key segments identifying one record
pub type HierarchicalKey = Vec<String>;

const MIN_TABLE_NAME_LEN: usize = 3;
const MAX_TABLE_NAME_LEN: usize = 255;

/// How hierarchical keys are flattened into partition key values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEncoding {
    /// Plain `.` join. Ambiguous when a segment contains `.`.
    Dotted,

    /// `.` join with `\` escaping inside segments
    #[default]
    Escaped,
}

impl KeyEncoding {
    /// Encodes a hierarchical key into its flat form.
    ///
    /// Fails with [`Error::InvalidKey`] when `segments` is empty or the flat key
    /// would be empty, since the table cannot hold an empty partition key.
    pub fn encode<S: AsRef<str>>(self, segments: &[S]) -> Result<String> {
        if segments.is_empty() {
            return Err(Error::InvalidKey("a key needs at least one segment".into()));
        }

        let flat = match self {
            KeyEncoding::Dotted => segments
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join("."),
            KeyEncoding::Escaped => {
                let mut flat = String::new();
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        flat.push(DELIMITER);
                    }
                    for c in segment.as_ref().chars() {
                        if c == DELIMITER || c == ESCAPE {
                            flat.push(ESCAPE);
                        }
                        flat.push(c);
                    }
                }
                flat
            }
        };

        if flat.is_empty() {
            return Err(Error::InvalidKey("the encoded key is empty".into()));
        }

        Ok(flat)
    }

    /// Decodes a flat partition key back into its segments.
    pub fn decode(self, flat: &str) -> HierarchicalKey {
        match self {
            KeyEncoding::Dotted => flat.split(DELIMITER).map(str::to_string).collect(),
            KeyEncoding::Escaped => {
                let mut segments = Vec::new();
                let mut current = String::new();
                let mut chars = flat.chars();
                while let Some(c) = chars.next() {
                    match c {
                        ESCAPE => match chars.next() {
                            Some(escaped) => current.push(escaped),
                            // trailing lone escape is kept literally
                            None => current.push(ESCAPE),
                        },
                        DELIMITER => segments.push(std::mem::take(&mut current)),
                        other => current.push(other),
                    }
                }
                segments.push(current);
                segments
            }
        }
    }
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyEncoding::Dotted => f.write_str("dotted"),
            KeyEncoding::Escaped => f.write_str("escaped"),
        }
    }
}

impl FromStr for KeyEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dotted" => Ok(KeyEncoding::Dotted),
            "escaped" => Ok(KeyEncoding::Escaped),
            other => Err(Error::Configuration(format!(
                "unknown key encoding \"{}\", expected dotted or escaped",
                other
            ))),
        }
    }
}

/// Encodes with the plain `.` join.
pub fn encode<S: AsRef<str>>(segments: &[S]) -> Result<String> {
    KeyEncoding::Dotted.encode(segments)
}

/// Splits a flat key on `.`.
pub fn decode(flat: &str) -> HierarchicalKey {
    KeyEncoding::Dotted.decode(flat)
}

/// Checks a table name against the DynamoDB naming rules.
///
/// See <https://docs.aws.amazon.com/amazondynamodb/latest/developerguide/HowItWorks.NamingRulesDataTypes.html>.
/// All violations are reported together in [`Error::InvalidTableName`].
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut errors = Vec::new();

    let len = name.chars().count();
    if !(MIN_TABLE_NAME_LEN..=MAX_TABLE_NAME_LEN).contains(&len) {
        errors.push(format!(
            "Table name length must be between {} and {} characters.",
            MIN_TABLE_NAME_LEN, MAX_TABLE_NAME_LEN
        ));
    }

    if name.is_empty() || !name.chars().all(is_table_name_char) {
        errors.push("Table names may only contain a-z, A-Z, 0-9, -, ., _".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidTableName {
            name: name.to_string(),
            errors,
        })
    }
}

fn is_table_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}
