//! Upstream game results and their canonical identity.
//!
//! Upstream is inconsistent about the type of `issueNumber`: the same period
//! may arrive as `"20250101100"` in one response and `20250101100` in the
//! next. Everything downstream keys on [`IssueKey`], which is built once here.
//!
//! Canonicalization:
//! - string or non-negative integer input, surrounding whitespace trimmed
//! - all-digit text is *numeric*, leading zeros stripped (`"007"` == `7`)
//! - anything else is *opaque* and kept verbatim
//!
//! Numeric keys order by digit count, then lexicographically, which is exact
//! numeric order for identifiers of any length. Opaque keys sort below all
//! numeric keys.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::RecordError;

/// Field name carrying the record identity.
pub const ISSUE_NUMBER_FIELD: &str = "issueNumber";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueKey {
    canonical: String,
    numeric: bool,
}

impl IssueKey {
    /// Canonicalize textual input.
    pub fn parse(text: &str) -> Result<Self, RecordError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RecordError::InvalidIssueNumber("empty string".to_string()));
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            let stripped = trimmed.trim_start_matches('0');
            let canonical = if stripped.is_empty() { "0" } else { stripped };
            return Ok(Self {
                canonical: canonical.to_string(),
                numeric: true,
            });
        }

        Ok(Self {
            canonical: trimmed.to_string(),
            numeric: false,
        })
    }

    /// Canonicalize a raw JSON `issueNumber` value.
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => match n.as_u64() {
                Some(v) => Self::parse(&v.to_string()),
                // Negative or fractional numbers are not period identifiers.
                None => Err(RecordError::InvalidIssueNumber(n.to_string())),
            },
            Value::Null => Err(RecordError::MissingIssueNumber),
            other => Err(RecordError::InvalidIssueNumber(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric
    }
}

impl Ord for IssueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric, other.numeric) {
            (true, true) => self
                .canonical
                .len()
                .cmp(&other.canonical.len())
                .then_with(|| self.canonical.cmp(&other.canonical)),
            (false, false) => self.canonical.cmp(&other.canonical),
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
        }
    }
}

impl PartialOrd for IssueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl Serialize for IssueKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}

/// One upstream game result.
///
/// The JSON object is kept exactly as received (field order included); only
/// the derived [`IssueKey`] is added alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Record {
    key: IssueKey,
    fields: Map<String, Value>,
}

impl Record {
    pub fn key(&self) -> &IssueKey {
        &self.key
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl TryFrom<Map<String, Value>> for Record {
    type Error = RecordError;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let raw = fields
            .get(ISSUE_NUMBER_FIELD)
            .ok_or(RecordError::MissingIssueNumber)?;
        let key = IssueKey::from_value(raw)?;
        Ok(Self { key, fields })
    }
}

impl TryFrom<Value> for Record {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Self::try_from(fields),
            Value::Null => Err(RecordError::NotAnObject("null")),
            Value::Bool(_) => Err(RecordError::NotAnObject("boolean")),
            Value::Number(_) => Err(RecordError::NotAnObject("number")),
            Value::String(_) => Err(RecordError::NotAnObject("string")),
            Value::Array(_) => Err(RecordError::NotAnObject("array")),
        }
    }
}

impl From<Record> for Map<String, Value> {
    fn from(record: Record) -> Self {
        record.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(v: Value) -> IssueKey {
        IssueKey::from_value(&v).unwrap()
    }

    #[test]
    fn string_and_number_forms_are_equal() {
        assert_eq!(key(json!("20250101100")), key(json!(20250101100u64)));
        assert_eq!(key(json!(" 00100 ")), key(json!(100)));
        assert_eq!(key(json!("000")).as_str(), "0");
    }

    #[test]
    fn numeric_order_ignores_text_length_quirks() {
        assert!(key(json!("100")) > key(json!("99")));
        assert!(key(json!("0100")) > key(json!("99")));
        // Longer than u128 still orders numerically.
        let big = "9".repeat(45);
        let bigger = format!("1{}", "0".repeat(45));
        assert!(IssueKey::parse(&bigger).unwrap() > IssueKey::parse(&big).unwrap());
    }

    #[test]
    fn opaque_keys_sort_below_numeric() {
        let opaque = key(json!("A-17"));
        assert!(!opaque.is_numeric());
        assert!(opaque < key(json!("1")));
        assert!(key(json!("A-17")) < key(json!("B-01")));
    }

    #[test]
    fn rejects_unusable_issue_numbers() {
        assert_eq!(
            IssueKey::from_value(&Value::Null),
            Err(RecordError::MissingIssueNumber)
        );
        assert!(IssueKey::from_value(&json!(-5)).is_err());
        assert!(IssueKey::from_value(&json!(1.5)).is_err());
        assert!(IssueKey::from_value(&json!("   ")).is_err());
        assert!(IssueKey::from_value(&json!(["1"])).is_err());
    }

    #[test]
    fn record_keeps_payload_verbatim() {
        let raw = json!({"issueNumber": "0042", "number": "7", "colour": "green"});
        let record = Record::try_from(raw.clone()).unwrap();
        assert_eq!(record.key().as_str(), "42");
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);

        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"issueNumber":"0042","number":"7","colour":"green"}"#);
    }

    #[test]
    fn record_requires_object_with_issue_number() {
        assert_eq!(
            Record::try_from(json!("x")),
            Err(RecordError::NotAnObject("string"))
        );
        assert_eq!(
            Record::try_from(json!({"number": 3})),
            Err(RecordError::MissingIssueNumber)
        );
        let parsed: Result<Record, _> = serde_json::from_str(r#"{"issueNumber": true}"#);
        assert!(parsed.is_err());
    }
}
