use super::sync::Tombstoned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A budget entity as returned by the service.
///
/// Only the fields the sync machinery needs are typed; everything else is kept
/// as raw JSON in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Months have no `id`; they are keyed by their `month` date
    #[serde(alias = "month")]
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    /// Read a milliunit amount such as `balance` or `amount`
    pub fn milliunits(&self, field: &str) -> Option<Milliunits> {
        self.get(field).and_then(Value::as_i64).map(Milliunits)
    }

    /// Decode a nested array of entities, e.g. the `categories` of a category group
    pub fn children(&self, field: &str) -> Vec<Record> {
        self.get(field)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Tombstoned for Record {
    fn key(&self) -> &str {
        &self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Fixed-point currency amount, 1/1000 of a currency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Milliunits(pub i64);

impl Milliunits {
    pub fn from_units(units: f64) -> Self {
        Milliunits((units * 1000.0).round() as i64)
    }

    pub fn to_units(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl fmt::Display for Milliunits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:03}", sign, abs / 1000, abs % 1000)
    }
}
